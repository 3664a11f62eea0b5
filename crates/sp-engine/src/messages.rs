//! Fixed control messages.

use heapless::Vec as FixedVec;

use crate::traits::DirectMessage;

/// All Notes Off
pub const CC_ALL_NOTES_OFF: u8 = 0x7B;
/// All Sound Off
pub const CC_ALL_SOUND_OFF: u8 = 0x78;

/// Two controller messages for each of the 16 channels.
pub const PANIC_LEN: usize = 32;

/// The Panic burst.
pub type PanicBurst = FixedVec<DirectMessage, PANIC_LEN>;

/// All Notes Off then All Sound Off on every channel, channel 0 first.
pub fn panic_burst() -> PanicBurst {
    let mut burst = PanicBurst::new();
    for channel in 0..16u8 {
        for param in [CC_ALL_NOTES_OFF, CC_ALL_SOUND_OFF] {
            // capacity is exactly 16 * 2
            let _ = burst.push(DirectMessage::Controller { channel, param, value: 0 });
        }
    }
    burst
}

/// Universal Real-Time Master Volume, `F0 7F 7F 04 01 00 vv F7`.
///
/// Only the coarse byte is set; `volume` is clamped to 0..=127.
pub fn master_volume_sysex(volume: u8) -> DirectMessage {
    DirectMessage::SysEx(vec![0xF0, 0x7F, 0x7F, 0x04, 0x01, 0x00, volume.min(0x7F), 0xF7])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_covers_every_channel() {
        let burst = panic_burst();
        assert_eq!(burst.len(), PANIC_LEN);
        assert_eq!(
            burst[0],
            DirectMessage::Controller { channel: 0, param: CC_ALL_NOTES_OFF, value: 0 }
        );
        assert_eq!(
            burst[31],
            DirectMessage::Controller { channel: 15, param: CC_ALL_SOUND_OFF, value: 0 }
        );
    }

    #[test]
    fn master_volume_bytes() {
        assert_eq!(
            master_volume_sysex(100).to_bytes(),
            vec![0xF0, 0x7F, 0x7F, 0x04, 0x01, 0x00, 100, 0xF7]
        );
        assert_eq!(master_volume_sysex(255).to_bytes()[6], 0x7F);
    }
}
