use std::cell::RefCell;
use std::fs::OpenOptions;
use std::path::Path;
use std::rc::Rc;
use log::{debug, warn};
use memmap2::{MmapMut, MmapOptions};
use crate::drivers::AdcError;
/// Excitation current driven through resistive sensors.
///
/// One source serves every resistance channel of a board, so it is shared as
/// [`SharedCurrentSource`] and addressed by current-source channel number.
pub trait CurrentSource {
    fn set_up(&mut self, channel: u8, current_ua: u32) -> Result<(), AdcError>;
    fn switch_off(&mut self, channel: u8) -> Result<(), AdcError>;
}
pub type SharedCurrentSource = Rc<RefCell<dyn CurrentSource>>;
/// Board without a controllable current source.
#[derive(Debug, Default)]
pub struct NoCurrentSource;
impl CurrentSource for NoCurrentSource {
    fn set_up(&mut self, channel: u8, current_ua: u32) -> Result<(), AdcError> {
        debug!("no current source: ignoring {current_ua} uA on channel {channel}");
        Ok(())
    }
    fn switch_off(&mut self, _channel: u8) -> Result<(), AdcError> {
        Ok(())
    }
}
const LRADC_MAP_LEN: usize = 0x1000;
const HW_LRADC_CTRL2: usize = 0x20;
const REG_SET: usize = 0x4;
const REG_CLR: usize = 0x8;
const ISRC_STEP_UA: u32 = 20;
const ISRC_MAX_STEPS: u32 = 0xF;
const ISRC_CHANNELS: u8 = 2;
/// Temperature-sensor current sources of the i.MX23/28 LRADC.
///
/// `HW_LRADC_CTRL2` holds a 4-bit current field per source (20 uA steps) in
/// bits 0..8 and the per-source enable bits at 8 and 9. Only LRADC channels 0
/// and 1 have a source; requests for other channels are ignored.
pub struct MxsLradcCurrentSource {
    regs: MmapMut,
}
impl MxsLradcCurrentSource {
    pub fn open(device: &Path, base_address: u64) -> Result<Self, AdcError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(device)
            .map_err(|e| AdcError::CurrentSource(format!("cannot open {}: {e}", device.display())))?;
        // SAFETY: the mapping covers only the LRADC register page and is owned
        // by this value; nothing else in the process maps it.
        let regs = unsafe {
            MmapOptions::new()
                .offset(base_address)
                .len(LRADC_MAP_LEN)
                .map_mut(&file)
        }
        .map_err(|e| {
            AdcError::CurrentSource(format!(
                "cannot map LRADC registers at {base_address:#x}: {e}"
            ))
        })?;
        Ok(Self { regs })
    }
    fn write_reg(&mut self, offset: usize, value: u32) {
        let reg = self.regs[offset..offset + 4].as_mut_ptr().cast::<u32>();
        // SAFETY: `offset` is a word-aligned register inside the page-aligned
        // mapping; registers need a volatile store.
        unsafe { reg.write_volatile(value) }
    }
}
impl CurrentSource for MxsLradcCurrentSource {
    fn set_up(&mut self, channel: u8, current_ua: u32) -> Result<(), AdcError> {
        if channel >= ISRC_CHANNELS {
            debug!("LRADC channel {channel} has no current source");
            return Ok(());
        }
        let mut steps = current_ua / ISRC_STEP_UA;
        if steps > ISRC_MAX_STEPS {
            warn!(
                "{current_ua} uA exceeds the LRADC source range, using {} uA",
                ISRC_MAX_STEPS * ISRC_STEP_UA
            );
            steps = ISRC_MAX_STEPS;
        }
        let shift = 4 * u32::from(channel);
        self.write_reg(HW_LRADC_CTRL2 + REG_CLR, ISRC_MAX_STEPS << shift);
        self.write_reg(
            HW_LRADC_CTRL2 + REG_SET,
            (steps << shift) | (1 << (8 + u32::from(channel))),
        );
        Ok(())
    }
    fn switch_off(&mut self, channel: u8) -> Result<(), AdcError> {
        if channel >= ISRC_CHANNELS {
            return Ok(());
        }
        self.write_reg(HW_LRADC_CTRL2 + REG_CLR, 1 << (8 + u32::from(channel)));
        Ok(())
    }
}
