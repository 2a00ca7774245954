//! Protocol constants

/// Length (bytes) of the frame header that carries the payload size
pub const FRAME_HEADER_LEN: usize = 8;

/// Default sanity limit on a single frame's payload length.
///
/// Experimental data sets (camera frames, spectra) can be large, but a
/// declared length beyond this is treated as a corrupt stream.
pub const DEFAULT_MAX_FRAME_LEN: u64 = 256 * 1024 * 1024;

/// Default TCP port for the data broker.
///
/// Distinct from typical instrument-server ports so both can run on one
/// host.
pub const DEFAULT_PORT: u16 = 30101;

/// Default capacity of each sink's bounded queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;
