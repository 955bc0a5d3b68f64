//! Wire protocol constants for serial LED controllers.
//!
//! Frames are newline-terminated ASCII, `KEY:payload\n`. The controller
//! accepts the outbound keys below and echoes state back using the same
//! grammar, plus `OK` / `ERR:<message>` acknowledgements.
//!
//! ```text
//! POWER:<0|1>
//! BRIGHTNESS:<0..255>
//! COLOR:<r>,<g>,<b>        (each 0..255)
//! EFFECT:<name>:<speed>    (speed 0..100)
//! MUSIC:<0|1>
//! SCHEDULE:<HH>:<MM>:<0|1>:<weekday mask>
//! ```

// ── Frame keys ──

pub const KEY_POWER: &str = "POWER";
pub const KEY_BRIGHTNESS: &str = "BRIGHTNESS";
pub const KEY_COLOR: &str = "COLOR";
pub const KEY_EFFECT: &str = "EFFECT";
pub const KEY_MUSIC: &str = "MUSIC";
pub const KEY_SCHEDULE: &str = "SCHEDULE";

/// Acknowledgement sent by the controller after a successful command.
pub const FRAME_OK: &str = "OK";

/// Prefix of an error report from the controller (`ERR:<message>`).
pub const KEY_ERROR: &str = "ERR";

// ── Framing ──

/// Separator between key and payload.
pub const KEY_SEPARATOR: char = ':';

/// Frame terminator.
pub const FRAME_TERMINATOR: u8 = b'\n';

/// Longest inbound frame accepted before the decoder gives up on it.
pub const MAX_FRAME_LEN: usize = 256;

// ── Value ranges ──

/// Brightness is expressed in percent on the API side.
pub const MAX_BRIGHTNESS_PERCENT: u8 = 100;

/// Brightness range on the wire.
pub const MAX_WIRE_BRIGHTNESS: u8 = 255;

/// Effect speed range (percent).
pub const MAX_EFFECT_SPEED: u8 = 100;

/// Longest effect name the controller firmware stores.
pub const MAX_EFFECT_NAME_LEN: usize = 32;

/// Weekday bitmask: bit 0 = Monday … bit 6 = Sunday.
pub const ALL_WEEKDAYS: u8 = 0b0111_1111;

/// Scale an API brightness (percent) to the wire range: `round(percent * 2.55)`.
///
/// Rounding is done on the exact decimal product, halves up, not on a binary
/// float (where `90.0 * 2.55` lands just below 229.5). So 50 → 128 and
/// 90 → 230. Out-of-range input is clamped to 100 first.
pub fn brightness_to_wire(percent: u8) -> u8 {
    let p = u32::from(percent.min(MAX_BRIGHTNESS_PERCENT));
    let max = u32::from(MAX_WIRE_BRIGHTNESS);
    let scaled = (p * max + 50) / 100;
    scaled.min(max) as u8
}

/// Scale a wire brightness back to percent: `round(n / 2.55)`.
pub fn brightness_from_wire(wire: u8) -> u8 {
    let max = u32::from(MAX_WIRE_BRIGHTNESS);
    let p = (u32::from(wire) * 100 + max / 2) / max;
    p.min(u32::from(MAX_BRIGHTNESS_PERCENT)) as u8
}
