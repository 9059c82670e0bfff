pub mod notifier;
pub mod payment;
pub mod provisioner;
pub mod reconciler;

#[cfg(test)]
pub mod testing;
