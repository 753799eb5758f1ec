use std::str::FromStr as _;

use lifespan::{AppBuilder, StdError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing_subscriber::filter::{Directive, EnvFilter};
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use crate::{Config, ConfigSection};

/// Installed logging setup, stored as an app component.
pub struct Tracing {
    level: tracing::Level,
}

impl Tracing {
    /// Installs the global subscriber described by the `tracing` config
    /// section. Does nothing when the section is absent or a subscriber has
    /// already been installed for this app.
    pub fn build(app: &mut AppBuilder) -> Result<(), StdError> {
        if app.has_component::<Tracing>() {
            return Ok(());
        }
        let config = match app.get_component_ref::<Config>() {
            Some(config) => config.get::<Option<TracingConfig>>(TracingConfig::key())?,
            None => None,
        };
        let Some(config) = config else {
            return Ok(());
        };
        let mut filter = EnvFilter::default();
        for directive in &config.directives {
            filter = filter.add_directive(directive.parse::<Directive>().map_err(Box::new)?);
        }
        filter = filter.add_directive(config.level.into());
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::Layer::default())
            .try_init()?;
        app.add_component(Self {
            level: config.level,
        });
        Ok(())
    }

    pub fn level(&self) -> tracing::Level {
        self.level
    }
}

#[derive(Serialize, Deserialize)]
pub struct TracingConfig {
    #[serde(
        serialize_with = "serialize_level",
        deserialize_with = "deserialize_level",
        default = "default_level"
    )]
    pub level: tracing::Level,
    /// Extra `EnvFilter` directives such as `"hyper=warn"`.
    #[serde(default)]
    pub directives: Vec<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            directives: Vec::new(),
        }
    }
}

impl ConfigSection for TracingConfig {
    fn key() -> &'static str {
        "tracing"
    }
}

fn serialize_level<S>(v: &tracing::Level, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(v.as_str())
}

fn deserialize_level<'de, D>(deserializer: D) -> Result<tracing::Level, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    String::deserialize(deserializer)
        .and_then(|v| tracing::Level::from_str(&v).map_err(|v| Error::custom(format!("{v}"))))
}

fn default_level() -> tracing::Level {
    tracing::Level::DEBUG
}
