//! Sound output for notifications.
//!
//! Playback is best effort. A player that cannot make a sound returns
//! [`WardError::DeliveryDegraded`] and the dispatcher carries on with the
//! visual notice alone.

use std::io::Write;

use wardwatch_core::{Result, WardError};

use crate::preferences::SoundType;

/// Something that can play a notification sound.
pub trait SoundPlayer: Send {
    /// Play `sound` at `volume` (`0.0..=1.0`).
    fn play(&mut self, sound: SoundType, volume: f32) -> Result<()>;
}

impl<P: SoundPlayer + ?Sized> SoundPlayer for Box<P> {
    fn play(&mut self, sound: SoundType, volume: f32) -> Result<()> {
        (**self).play(sound, volume)
    }
}

/// Rings the terminal bell (BEL, 0x07).
///
/// A gentle sound is a single bell, an urgent one rings three times. The
/// terminal decides how loud that is, so any non-zero volume rings.
pub struct TerminalBell<W: Write + Send = std::io::Stdout> {
    out: W,
}

impl TerminalBell {
    pub fn stdout() -> Self {
        Self {
            out: std::io::stdout(),
        }
    }
}

impl<W: Write + Send> TerminalBell<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn rings(sound: SoundType) -> usize {
        match sound {
            SoundType::Gentle => 1,
            SoundType::Urgent => 3,
        }
    }
}

impl<W: Write + Send> SoundPlayer for TerminalBell<W> {
    fn play(&mut self, sound: SoundType, volume: f32) -> Result<()> {
        if volume <= 0.0 {
            return Ok(());
        }
        let bells = "\x07".repeat(Self::rings(sound));
        self.out
            .write_all(bells.as_bytes())
            .and_then(|()| self.out.flush())
            .map_err(|e| WardError::delivery_degraded(format!("terminal bell failed: {e}")))
    }
}

/// Player that never makes a sound.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentPlayer;

impl SoundPlayer for SilentPlayer {
    fn play(&mut self, _sound: SoundType, _volume: f32) -> Result<()> {
        Ok(())
    }
}
