use crate::{SwitchRegistry, ETHERNET_PLUGIN_ID};

#[test]
fn ethernet_provider_registered_and_callable() {
    let registry = SwitchRegistry::with_ethernet();
    let provider = registry.get(ETHERNET_PLUGIN_ID).unwrap();
    provider.node_init().unwrap();
    provider.job_preinit(1).unwrap();
    assert!(provider.job_suspend_test(1).unwrap());
    provider.job_fini(1).unwrap();
}

#[test]
fn unregistered_plugin_errors() {
    let registry = SwitchRegistry::new();
    assert!(registry.get(999).is_err());
}
