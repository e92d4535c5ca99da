/// Playable-audio source capability
///
/// The mixing layer never touches audio data itself; it drives an opaque
/// source object through this trait. The bundled rodio implementation lives
/// in `backend`; tests substitute a recording mock.
use crate::effect::EffectSetting;

/// The opaque playable-audio capability driven by the mixing layer.
///
/// All control calls are non-blocking and infallible at this boundary.
/// Effect names the source does not support are its own concern: it may
/// ignore or log them, but must not fail.
pub trait AudioSource {
    /// Create an independent instance sharing no mutable state with `self`.
    ///
    /// The clone starts with fresh default control state (volume 1, pitch 1,
    /// not looping, stopped); the mixing layer pushes the intended state
    /// before starting transport.
    fn clone_source(&self) -> Box<dyn AudioSource>;

    /// Start or resume transport.
    fn play(&mut self);

    /// Pause transport, keeping the current position.
    fn pause(&mut self);

    /// Stop transport and discard the current position.
    fn stop(&mut self);

    /// Seek to an offset from the start, in seconds.
    fn seek(&mut self, seconds: f64);

    /// Whether the source is currently producing audio.
    fn is_playing(&self) -> bool;

    /// Set the volume multiplier.
    fn set_volume(&mut self, volume: f32);

    /// Set the pitch/speed multiplier.
    fn set_pitch(&mut self, pitch: f32);

    /// Whether the source restarts at the end.
    fn is_looping(&self) -> bool;

    /// Set whether the source restarts at the end.
    fn set_looping(&mut self, looping: bool);

    /// Enable, reconfigure, or explicitly disable a named effect.
    ///
    /// `EffectSetting::Disabled` is an explicit disable call, not a no-op:
    /// the source must tear the effect down if it was previously applied.
    fn apply_effect(&mut self, name: &str, setting: &EffectSetting);
}
