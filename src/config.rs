//! System configuration parameters
//!
//! Tunables for the bridge server plus the identity block reported to
//! hosts.  Compiled-in defaults cover normal operation; both blocks
//! serialize (`postcard` compact, `serde_json` readable) so a build
//! can stage overrides in flash or dump its config over the log.

use serde::{Deserialize, Serialize};

/// Packs a device-type tag and a version pair into the wire-visible
/// version word: `0xTTMMmmmm` (type, major, minor).
pub const fn version_word(device_type: u8, major: u8, minor: u16) -> u32 {
    ((device_type as u32) << 24) | ((major as u32) << 16) | minor as u32
}

/// Everything the firmware needs at boot, in one block.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub protocol: ProtocolConfig,
    pub board: BoardInfo,
}

/// Wire-protocol server tuning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Cycles without forward progress before a half-parsed frame is
    /// abandoned.  0 disables the budget.
    pub data_timeout_cycles: u32,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            data_timeout_cycles: 30_000, // ~100 ms of main-loop polling
        }
    }
}

/// Identity block for `GetDeviceInfo` replies.
///
/// The 16-byte GUID is not here; it comes from the chip's unique id
/// via the system port at request time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoardInfo {
    /// Wire-visible firmware version (see [`version_word`]).
    pub firmware_version: u32,
    pub part_number: u32,
    pub bootcode_version: u32,
}

impl Default for BoardInfo {
    fn default() -> Self {
        Self {
            firmware_version: version_word(b'B', 0, 2),
            part_number: 0x1001,
            bootcode_version: 0x0100,
        }
    }
}
