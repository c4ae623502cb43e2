//! Atrium plugin runtime.
//!
//! The host core for a desktop application shell: plugins register
//! against a shared event bus, a cross-plugin service registry, a
//! namespaced HTTP route table, and a per-plugin-versioned store, and
//! the manager drives their lifecycle (register → init → start → stop)
//! with per-plugin failure isolation.

pub mod bus;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod manager;
pub mod migrate;
pub mod routes;
pub mod runtime;
pub mod services;

pub use bus::{Event, EventBus, EventStream, SubscriptionInfo};
pub use config::HostConfig;
pub use context::{PluginContext, PluginHandle};
pub use descriptor::PluginDescriptor;
pub use error::RuntimeError;
pub use manager::{Plugin, PluginManager, PluginState, PluginStatus};
pub use migrate::SchemaStep;
pub use routes::{
    route_fn, HttpMethod, PluginRouter, RouteHandler, RouteMatch, RouteRegistry, RouteRequest,
};
pub use runtime::Runtime;
pub use services::{service_fn, ServiceHandler, ServiceRegistry};
