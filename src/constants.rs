//! Constants affecting worker pacing, correlation, and resource sizing.

use std::time::Duration;

/// Size in bytes of the fixed media header preceding every datagram.
pub const MEDIA_HEADER_LEN: usize = 12;

/// Sample rate of G.711 mu-law media, in Hz.
pub const SAMPLE_RATE_G711_HZ: u32 = 8_000;

/// Maximum size of a single media datagram we will ever see on the wire.
///
/// Comfortably above a 20ms G.711 frame (160 payload bytes + header) with
/// headroom for larger packetisation intervals.
pub const MAX_DATAGRAM_SIZE: usize = 1_500;

/// How far behind its media-clock deadline a returning packet may arrive
/// before it is counted as late.
pub const LATENESS_TOLERANCE: Duration = Duration::from_millis(3);

/// Correlator entries older than this are swept; any RTT beyond this is an
/// outage; not a measurement.
pub const CORRELATOR_MAX_AGE: Duration = Duration::from_secs(3);

/// Receive deadline for the worker's reader task; bounds how quickly it can
/// notice a stop signal.
pub const RECV_DEADLINE: Duration = Duration::from_millis(100);

/// Capacity of the bounded queue between a worker's reader and processor tasks.
pub const WORKER_QUEUE_CAPACITY: usize = 512;

/// Target kernel socket buffer size (send and receive) per worker socket.
pub const UDP_SOCKET_BUFFER_BYTES: usize = 2 * 1024 * 1024;

/// Cadence of the lifecycle manager's zombie-channel scrubber in production.
pub const ZOMBIE_SCRUB_INTERVAL: Duration = Duration::from_secs(120);

/// Capacity of a channel's latency sample buffer before chunked eviction.
pub const SAMPLE_BUFFER_CAPACITY: usize = 10_000;

/// Number of oldest samples dropped at once when the buffer is full.
pub const SAMPLE_BUFFER_EVICT_CHUNK: usize = 1_000;

/// Number of times `answer` is retried on a `NotFound` response.
pub const ANSWER_RETRY_LIMIT: usize = 3;

/// Fixed backoff between `answer` retries.
pub const ANSWER_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Request timeout applied to all control-client REST calls.
pub const CONTROL_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Cadence of the "list active channels" polling fallback.
pub const POLL_FALLBACK_INTERVAL: Duration = Duration::from_millis(100);

/// How long the event stream may stay disconnected before the manager falls
/// back to polling.
pub const EVENT_STREAM_GRACE: Duration = Duration::from_secs(2);
