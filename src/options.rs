/// Playback option record
///
/// The single configuration record accepted by constructors, `apply_options`
/// and `Sound::play`. Built with chained setters so call sites read like the
/// option tables they replace.
use crate::effect::{EffectMap, EffectSetting};
use crate::tag::Tag;

/// Options for configuring a taggable object or starting playback.
///
/// `volume`, `tags` and `effects` are consumed by [`apply_options`]
/// (fully replacing the target's prior state); `pitch`, `looping` and `seek`
/// are consumed by `Sound::play` when starting an instance. `looping` left
/// unset falls back to the owning sound's default.
///
/// [`apply_options`]: crate::Taggable::apply_options
#[derive(Debug, Clone)]
pub struct PlayOptions {
    pub(crate) volume: f32,
    pub(crate) tags: Vec<Tag>,
    pub(crate) effects: EffectMap,
    pub(crate) pitch: f32,
    pub(crate) looping: Option<bool>,
    pub(crate) seek: f64,
}

impl Default for PlayOptions {
    fn default() -> Self {
        Self {
            volume: 1.0,
            tags: Vec::new(),
            effects: EffectMap::new(),
            pitch: 1.0,
            looping: None,
            seek: 0.0,
        }
    }
}

impl PlayOptions {
    /// Create an option record with defaults (volume 1, pitch 1, no tags,
    /// no effects, seek 0).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the object's own volume multiplier.
    pub fn volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    /// Apply a tag. Tags accumulate in call order.
    pub fn tag(mut self, tag: &Tag) -> Self {
        self.tags.push(tag.clone());
        self
    }

    /// Apply several tags in the given order.
    pub fn tags(mut self, tags: &[Tag]) -> Self {
        self.tags.extend(tags.iter().cloned());
        self
    }

    /// Set an effect override. Accepts `true`/`false` or a parameter record.
    pub fn effect(mut self, name: impl Into<String>, setting: impl Into<EffectSetting>) -> Self {
        self.effects.insert(name.into(), setting.into());
        self
    }

    /// Set the pitch/speed multiplier.
    pub fn pitch(mut self, pitch: f32) -> Self {
        self.pitch = pitch;
        self
    }

    /// Override the owning sound's default loop flag.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = Some(looping);
        self
    }

    /// Start playback at an offset from the beginning, in seconds.
    pub fn seek(mut self, seconds: f64) -> Self {
        self.seek = seconds;
        self
    }
}
