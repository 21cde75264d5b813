use crate::config::{ConfigError, GatewaySettings, PaymentsConfig, SystemUrls};
use crate::error::RegistryError;
use crate::gateways::{self, Capabilities, PaymentGateway};
use crate::transport::HttpTransport;
use std::collections::HashMap;
use std::sync::Arc;

/// Everything an adapter factory gets to build one configured gateway.
pub struct AdapterContext<'a> {
    pub name: &'a str,
    pub settings: &'a GatewaySettings,
    pub urls: &'a SystemUrls,
    pub transport: Arc<dyn HttpTransport>,
}

pub type GatewayFactory = Arc<
    dyn Fn(&AdapterContext<'_>) -> Result<Arc<dyn PaymentGateway>, ConfigError> + Send + Sync,
>;

pub struct GatewayRegistry {
    config: PaymentsConfig,
    urls: SystemUrls,
    transport: Arc<dyn HttpTransport>,
    factories: HashMap<String, GatewayFactory>,
}

impl GatewayRegistry {
    /// Registry with every built-in adapter registered. Adapters built by it
    /// share `transport` and therefore one connection pool.
    pub fn from_config(config: PaymentsConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let urls = config.system_urls();
        let mut registry = Self {
            config,
            urls,
            transport,
            factories: HashMap::new(),
        };
        registry.register(gateways::urway::NAME, gateways::urway::build);
        registry.register(gateways::stripe::NAME, gateways::stripe::build);
        registry.register(gateways::myfatoorah::NAME, gateways::myfatoorah::build);
        registry.register(gateways::tabby::NAME, gateways::tabby::build);
        registry.register(gateways::fawry::NAME, gateways::fawry::build);
        registry.register(gateways::geidea::NAME, gateways::geidea::build);
        registry.register(gateways::paymob::NAME, gateways::paymob::build);
        registry.register(gateways::hyperpay::NAME, gateways::hyperpay::build);
        registry.register(gateways::clickpay::NAME, gateways::clickpay::build);
        registry.register(gateways::moyasar::NAME, gateways::moyasar::build);
        registry.register(gateways::tap::NAME, gateways::tap::build);
        registry.register(gateways::paypal::NAME, gateways::paypal::build);
        registry.register(gateways::tamara::NAME, gateways::tamara::build);
        registry.register(gateways::telr::NAME, gateways::telr::build);
        registry.register(gateways::alrajhibank::NAME, gateways::alrajhibank::build);
        registry
    }

    /// Adds or replaces the factory for `driver`.
    pub fn register<F>(&mut self, driver: &str, factory: F)
    where
        F: Fn(&AdapterContext<'_>) -> Result<Arc<dyn PaymentGateway>, ConfigError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(driver.to_string(), Arc::new(factory));
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn PaymentGateway>, RegistryError> {
        let settings = self
            .config
            .gateways
            .get(name)
            .ok_or_else(|| RegistryError::UnknownGateway(name.to_string()))?;

        let driver = settings.driver_or(name);
        let factory = self
            .factories
            .get(driver)
            .ok_or_else(|| RegistryError::ContractViolation {
                gateway: name.to_string(),
                reason: format!("no adapter registered for driver `{driver}`"),
            })?;

        let ctx = AdapterContext {
            name,
            settings,
            urls: &self.urls,
            transport: self.transport.clone(),
        };
        let gateway = factory(&ctx).map_err(|e| {
            tracing::warn!(gateway = name, error = %e, "gateway configuration incomplete");
            RegistryError::Config(e)
        })?;

        check_contract(name, gateway.as_ref())?;
        tracing::debug!(gateway = name, driver, "gateway resolved");
        Ok(gateway)
    }

    /// Configured gateway names in configuration order.
    pub fn available_gateways(&self) -> impl Iterator<Item = &str> + '_ {
        self.config.gateways.keys().map(String::as_str)
    }

    pub fn system_urls(&self) -> &SystemUrls {
        &self.urls
    }
}

fn check_contract(name: &str, gateway: &dyn PaymentGateway) -> Result<(), RegistryError> {
    let caps = gateway.capabilities();
    let violation = |reason: &str| RegistryError::ContractViolation {
        gateway: name.to_string(),
        reason: reason.to_string(),
    };

    if !(caps.initiate && caps.verify_callback && caps.auth_headers) {
        return Err(violation(
            "initiate, verify_callback and auth_headers are required",
        ));
    }
    match (caps.has_optional(), gateway.operations().is_some()) {
        (true, false) => Err(violation(
            "declares optional operations but exposes none",
        )),
        (false, true) => Err(violation(
            "exposes operations without declaring any",
        )),
        _ => Ok(()),
    }
}
