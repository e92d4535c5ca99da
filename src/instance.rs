/// Instance: one live playback occurrence of a sound
///
/// The instance is the only entity that actually touches the external audio
/// source. It computes effective volume and effects from itself, its applied
/// tags and its owning sound, and pushes the results to the source whenever
/// a change notification reaches it.
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::effect::{overlay, strip_disabled, EffectMap, EffectSetting};
use crate::error::MixerError;
use crate::options::PlayOptions;
use crate::sound::SoundInner;
use crate::source::AudioSource;
use crate::tag::Tag;
use crate::taggable::{self, Listener, TagTarget, Taggable, TaggableState};

struct InstanceState {
    taggable: TaggableState,
    source: Box<dyn AudioSource>,
    /// Relation only; the sound owns the instance, never the reverse.
    sound: Weak<SoundInner>,
    paused: bool,
    /// Effect names currently pushed onto the source, kept so a removed
    /// override results in an explicit disable call instead of a stuck
    /// effect.
    applied_effects: HashSet<String>,
}

pub(crate) struct InstanceInner {
    id: u64,
    state: Mutex<InstanceState>,
}

/// One concrete, currently-or-recently-playing occurrence of a [`Sound`].
///
/// Handles are cheap clones referring to the same pooled instance; the pool
/// keeps an instance alive for the owning sound's lifetime and reuses it
/// once it has stopped.
///
/// [`Sound`]: crate::Sound
#[derive(Clone)]
pub struct Instance {
    inner: Arc<InstanceInner>,
}

impl Instance {
    pub(crate) fn new(source: Box<dyn AudioSource>, sound: Weak<SoundInner>) -> Self {
        Self {
            inner: Arc::new(InstanceInner {
                id: taggable::next_id(),
                state: Mutex::new(InstanceState {
                    taggable: TaggableState::new(),
                    source,
                    sound,
                    paused: false,
                    applied_effects: HashSet::new(),
                }),
            }),
        }
    }

    /// Reset the full option state and start transport. Invoked by
    /// `Sound::play` for fresh and reused instances alike.
    pub(crate) fn start(&self, options: &PlayOptions, default_loop: bool) -> Result<(), MixerError> {
        self.inner.state.lock().paused = false;
        // Pushes the recomputed volume and effect set to the source before
        // transport starts.
        taggable::apply_option_state(&self.inner, options)?;

        let mut state = self.inner.state.lock();
        state.source.set_pitch(options.pitch);
        state
            .source
            .set_looping(options.looping.unwrap_or(default_loop));
        state.source.seek(options.seek);
        state.source.play();
        Ok(())
    }

    /// True iff the source is not playing and the instance is not paused;
    /// a paused instance is not stopped and will not be reused.
    pub fn is_stopped(&self) -> bool {
        let state = self.inner.state.lock();
        !state.source.is_playing() && !state.paused
    }

    /// Whether the source is currently producing audio.
    pub fn is_playing(&self) -> bool {
        self.inner.state.lock().source.is_playing()
    }

    /// Whether the instance is in an explicit paused state.
    pub fn is_paused(&self) -> bool {
        self.inner.state.lock().paused
    }

    /// Pause transport, keeping the position.
    pub fn pause(&self) {
        let mut state = self.inner.state.lock();
        state.paused = true;
        state.source.pause();
    }

    /// Resume a paused instance.
    pub fn resume(&self) {
        let mut state = self.inner.state.lock();
        state.paused = false;
        state.source.play();
    }

    /// Stop transport. Clears the paused flag: stopped takes precedence for
    /// future reuse checks.
    pub fn stop(&self) {
        let mut state = self.inner.state.lock();
        state.paused = false;
        state.source.stop();
    }

    /// Fully resolved volume: own volume, applied tags, and the owning
    /// sound's effective volume multiplied through.
    pub fn effective_volume(&self) -> f32 {
        self.inner.effective_volume()
    }

    /// Fully resolved effect set, force-disabled entries removed.
    /// Precedence: own overrides > owning sound > applied tags.
    pub fn effective_effects(&self) -> EffectMap {
        let mut merged = self.inner.merged_effects();
        strip_disabled(&mut merged);
        merged
    }

    pub(crate) fn set_source_looping(&self, looping: bool) {
        self.inner.state.lock().source.set_looping(looping);
    }

    pub(crate) fn volume_changed(&self) {
        self.inner.volume_changed();
    }

    pub(crate) fn effects_changed(&self) {
        self.inner.effects_changed();
    }
}

impl InstanceInner {
    fn effective_volume(&self) -> f32 {
        let (base, sound) = {
            let state = self.state.lock();
            (state.taggable.effective_volume(), state.sound.upgrade())
        };
        match sound {
            Some(sound) => base * sound.effective_volume(),
            None => base,
        }
    }

    /// Merge tag-derived, sound-derived and own effects in override
    /// precedence order. Disabled markers survive the merge so a disable at
    /// any layer can mask an enable below it.
    fn merged_effects(&self) -> EffectMap {
        let mut out = EffectMap::new();
        let (own, sound) = {
            let state = self.state.lock();
            state.taggable.collect_tag_effects(&mut out);
            (state.taggable.effects.clone(), state.sound.upgrade())
        };
        if let Some(sound) = sound {
            sound.collect_effective_effects(&mut out);
        }
        overlay(&mut out, &own);
        out
    }

    /// Apply the merged effect set to the source as a diff: push every
    /// present name, explicitly disable names that dropped out.
    fn push_effects(&self) {
        let mut merged = self.merged_effects();
        strip_disabled(&mut merged);

        let mut guard = self.state.lock();
        let state = &mut *guard;
        let stale: Vec<String> = state
            .applied_effects
            .iter()
            .filter(|name| !merged.contains_key(*name))
            .cloned()
            .collect();
        for name in stale {
            state.source.apply_effect(&name, &EffectSetting::Disabled);
            state.applied_effects.remove(&name);
        }
        for (name, setting) in &merged {
            state.source.apply_effect(name, setting);
            state.applied_effects.insert(name.clone());
        }
    }
}

impl Listener for InstanceInner {
    fn id(&self) -> u64 {
        self.id
    }

    fn volume_changed(&self) {
        let volume = self.effective_volume();
        self.state.lock().source.set_volume(volume);
    }

    fn effects_changed(&self) {
        self.push_effects();
    }
}

impl TagTarget for InstanceInner {
    fn with_state<R>(&self, f: impl FnOnce(&mut TaggableState) -> R) -> R {
        f(&mut self.state.lock().taggable)
    }

    fn listener(this: &Arc<Self>) -> Weak<dyn Listener> {
        Arc::downgrade(&(Arc::clone(this) as Arc<dyn Listener>))
    }
}

impl Taggable for Instance {
    fn volume(&self) -> f32 {
        taggable::own_volume(&*self.inner)
    }

    fn set_volume(&self, volume: f32) {
        taggable::set_own_volume(&*self.inner, volume);
    }

    fn tag(&self, tags: &[Tag]) -> Result<(), MixerError> {
        taggable::apply_tags(&self.inner, tags)
    }

    fn untag(&self, tags: &[Tag]) {
        taggable::remove_tags(&self.inner, tags);
    }

    fn effect(&self, name: &str) -> Option<EffectSetting> {
        taggable::own_effect(&*self.inner, name)
    }

    fn set_effect(&self, name: &str, setting: EffectSetting) {
        taggable::set_own_effect(&*self.inner, name, setting);
    }

    fn remove_effect(&self, name: &str) {
        taggable::remove_own_effect(&*self.inner, name);
    }

    fn apply_options(&self, options: &PlayOptions) -> Result<(), MixerError> {
        taggable::apply_option_state(&self.inner, options)
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Instance {}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.inner.id)
            .finish()
    }
}
