//! Playback device layer: the remote engine contract, credentials
//! provisioning and the adapter that owns reconnection, token refresh and
//! the synthesized progress tick.

pub mod adapter;
pub mod credentials;
pub mod engine;
pub mod sim;

pub use adapter::{DeviceAdapter, DeviceConfig, DeviceNotification};
pub use credentials::{
    CredentialsProvider, DeviceCredentials, HttpCredentialsProvider, LocalCredentialsProvider,
};
pub use engine::{EngineError, EngineState, RemoteEngine};
pub use sim::SimulatedEngine;
