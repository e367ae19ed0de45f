pub(crate) mod monitor_service;
pub(crate) mod reconcile_service;
