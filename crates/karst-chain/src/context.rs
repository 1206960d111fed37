//! Kernel context: chain parameters plus the registered sinks.
//!
//! A context is immutable once built and shared by `Arc` with every manager
//! that uses it.

use std::sync::Arc;

use karst_core::params::{ChainParams, ChainType};

use crate::notifications::{
    Notifications, NullNotifications, NullValidationInterface, ValidationInterface,
};

/// Immutable bundle of parameters and sinks.
pub struct Context {
    chain_params: Arc<ChainParams>,
    notifications: Arc<dyn Notifications>,
    validation: Arc<dyn ValidationInterface>,
}

impl Context {
    pub fn chain_params(&self) -> &Arc<ChainParams> {
        &self.chain_params
    }

    pub fn notifications(&self) -> &Arc<dyn Notifications> {
        &self.notifications
    }

    pub fn validation(&self) -> &Arc<dyn ValidationInterface> {
        &self.validation
    }
}

/// Builder for [`Context`]. Defaults: regtest parameters and no-op sinks.
pub struct ContextBuilder {
    chain_params: Arc<ChainParams>,
    notifications: Arc<dyn Notifications>,
    validation: Arc<dyn ValidationInterface>,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self {
            chain_params: Arc::new(ChainParams::new(ChainType::Regtest)),
            notifications: Arc::new(NullNotifications),
            validation: Arc::new(NullValidationInterface),
        }
    }

    pub fn chain_type(mut self, chain_type: ChainType) -> Self {
        self.chain_params = Arc::new(ChainParams::new(chain_type));
        self
    }

    pub fn chain_params(mut self, params: Arc<ChainParams>) -> Self {
        self.chain_params = params;
        self
    }

    pub fn notifications(mut self, notifications: Arc<dyn Notifications>) -> Self {
        self.notifications = notifications;
        self
    }

    pub fn validation(mut self, validation: Arc<dyn ValidationInterface>) -> Self {
        self.validation = validation;
        self
    }

    pub fn build(self) -> Arc<Context> {
        Arc::new(Context {
            chain_params: self.chain_params,
            notifications: self.notifications,
            validation: self.validation,
        })
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
