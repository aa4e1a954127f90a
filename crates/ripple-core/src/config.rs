use crate::types::ColourState;

/// Default application port.
pub const DEFAULT_MESH_PORT: u16 = 9001;

/// Configuration for a [`RippleRuntime`](crate::RippleRuntime).
///
/// All fields have sensible defaults. Use the builder pattern:
///
/// ```rust
/// use ripple_core::{ColourState, RippleConfig};
///
/// let config = RippleConfig::new()
///     .mesh_port(5001)
///     .initial_colour(ColourState::Green);
/// ```
#[derive(Debug, Clone)]
pub struct RippleConfig {
    /// Port bound on connect and used for every send.
    pub(crate) mesh_port: u16,
    /// Capacity of the runtime → application event channel.
    pub(crate) event_buffer: usize,
    /// Capacity of the application → runtime command channel.
    pub(crate) command_buffer: usize,
    /// Display colour before anything is received or chosen.
    pub(crate) initial_colour: ColourState,
    /// Select the first peer that joins as the recipient.
    pub(crate) auto_select_first_peer: bool,
}

impl Default for RippleConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RippleConfig {
    /// Create a new config with defaults.
    ///
    /// If the `RIPPLE_MESH_PORT` environment variable holds a valid port, it
    /// replaces the default. This can be overridden with [`.mesh_port()`].
    ///
    /// [`.mesh_port()`]: RippleConfig::mesh_port
    pub fn new() -> Self {
        let mesh_port = std::env::var("RIPPLE_MESH_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MESH_PORT);

        Self {
            mesh_port,
            event_buffer: 256,
            command_buffer: 64,
            initial_colour: ColourState::Red,
            auto_select_first_peer: true,
        }
    }

    pub fn mesh_port(mut self, port: u16) -> Self {
        self.mesh_port = port;
        self
    }

    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity.max(1);
        self
    }

    pub fn command_buffer(mut self, capacity: usize) -> Self {
        self.command_buffer = capacity.max(1);
        self
    }

    pub fn initial_colour(mut self, colour: ColourState) -> Self {
        self.initial_colour = colour;
        self
    }

    /// Disable automatic recipient selection (default: enabled).
    pub fn auto_select_first_peer(mut self, enabled: bool) -> Self {
        self.auto_select_first_peer = enabled;
        self
    }

    pub fn port(&self) -> u16 {
        self.mesh_port
    }
}
