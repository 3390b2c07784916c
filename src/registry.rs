//! The narrow interface to the host framework.
//!
//! The host owns component IDs, UART buses and output channels. [`Powermust`](crate::poller::Powermust)
//! calls into a [`Registry`] exactly once per item while it is being constructed,
//! keeps the returned handles, and never calls back afterwards.

use crate::{
    config::{ChannelSpec, TransportConfig},
    error::ConfigError,
};

/// Host-assigned identity of a registered component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentHandle(pub u16);

/// Host-assigned identity of an output channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelHandle(pub u16);

pub trait Registry {
    /// Register a component under its configured ID.
    fn register(&mut self, id: &str) -> ComponentHandle;

    /// Attach the component to a UART bus. Fails if the bus is unknown or its
    /// line settings cannot be honoured.
    fn register_transport_binding(
        &mut self,
        component: ComponentHandle,
        transport: &TransportConfig,
    ) -> Result<(), ConfigError>;

    /// Create an output channel owned by the host.
    fn register_output_channel(
        &mut self,
        component: ComponentHandle,
        channel: &ChannelSpec,
    ) -> Result<ChannelHandle, ConfigError>;
}

impl<T: Registry + ?Sized> Registry for &mut T {
    fn register(&mut self, id: &str) -> ComponentHandle {
        (**self).register(id)
    }

    fn register_transport_binding(
        &mut self,
        component: ComponentHandle,
        transport: &TransportConfig,
    ) -> Result<(), ConfigError> {
        (**self).register_transport_binding(component, transport)
    }

    fn register_output_channel(
        &mut self,
        component: ComponentHandle,
        channel: &ChannelSpec,
    ) -> Result<ChannelHandle, ConfigError> {
        (**self).register_output_channel(component, channel)
    }
}
