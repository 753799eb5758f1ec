use lifespan::{AddScopedServiceExt as _, AddServiceExt as _, AppBuilder, Plugin, StdError};
use lifespan_base::{Config, ConfigSection};
use serde::{Deserialize, Serialize};

use crate::{
    ApplicationServiceOne, ApplicationServiceTwo, RequestService, RequestUtilityOne,
    RequestUtilityTwo,
};

/// Which implementation backs a capability.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Binding {
    One,
    #[default]
    Two,
}

/// The `bindings` config section.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingsConfig {
    #[serde(default)]
    pub application_service: Binding,
    #[serde(default)]
    pub request_utility: Binding,
}

impl ConfigSection for BindingsConfig {
    fn key() -> &'static str {
        "bindings"
    }
}

impl BindingsConfig {
    /// Registers exactly one implementation per capability, plus the
    /// [`RequestService`] built on top of them.
    pub fn install(&self, app: &mut AppBuilder) {
        match self.application_service {
            Binding::One => app.add_service::<ApplicationServiceOne>(),
            Binding::Two => app.add_service::<ApplicationServiceTwo>(),
        };
        match self.request_utility {
            Binding::One => app.add_scoped_service::<RequestUtilityOne>(),
            Binding::Two => app.add_scoped_service::<RequestUtilityTwo>(),
        };
        app.add_scoped_service::<RequestService>();
    }
}

/// Installs the bindings chosen by the `bindings` config section, or the
/// defaults when the section is absent.
pub struct BindingsPlugin;

impl Plugin for BindingsPlugin {
    async fn build(&self, app: &mut AppBuilder) -> Result<(), StdError> {
        let config = match app.get_component_ref::<Config>() {
            Some(config) => config.section::<BindingsConfig>()?,
            None => BindingsConfig::default(),
        };
        tracing::info!(
            application_service = ?config.application_service,
            request_utility = ?config.request_utility,
            "Installing bindings"
        );
        config.install(app);
        Ok(())
    }
}
