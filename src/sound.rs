/// Sound: playable template plus an instance pool
///
/// A sound owns the source template and a grow-only pool of instances.
/// `play` reuses the first stopped instance in creation order or clones the
/// template into a new one, so source allocation is bounded by the peak
/// number of overlapping plays rather than growing per call.
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::effect::{strip_disabled, EffectMap, EffectSetting};
use crate::error::MixerError;
use crate::instance::Instance;
use crate::options::PlayOptions;
use crate::source::AudioSource;
use crate::tag::Tag;
use crate::taggable::{self, Listener, TagTarget, Taggable, TaggableState};

pub(crate) struct SoundState {
    pub(crate) taggable: TaggableState,
    template: Box<dyn AudioSource>,
    looping: bool,
    instances: Vec<Instance>,
}

pub(crate) struct SoundInner {
    id: u64,
    state: Mutex<SoundState>,
}

/// A template for playable audio plus the pool of its live instances.
///
/// `Sound` is a cheap clonable handle; dropping the last handle stops and
/// releases every pooled instance's transport.
#[derive(Clone)]
pub struct Sound {
    inner: Arc<SoundInner>,
}

impl Sound {
    /// Create a sound from a source template with default settings.
    pub fn new(template: Box<dyn AudioSource>) -> Self {
        Self {
            inner: Arc::new(SoundInner {
                id: taggable::next_id(),
                state: Mutex::new(SoundState {
                    taggable: TaggableState::new(),
                    looping: false,
                    template,
                    instances: Vec::new(),
                }),
            }),
        }
    }

    /// Create a sound and initialize volume/tags/effects from an option
    /// record; `looping` (if set) becomes the template default.
    pub fn with_options(
        template: Box<dyn AudioSource>,
        options: &PlayOptions,
    ) -> Result<Self, MixerError> {
        let sound = Self::new(template);
        sound.apply_options(options)?;
        if let Some(looping) = options.looping {
            sound.inner.state.lock().looping = looping;
        }
        Ok(sound)
    }

    /// Play the sound: reuse the first stopped instance in creation order
    /// (its option state fully reset) or clone the template into a new one,
    /// then apply `options` and start transport.
    pub fn play(&self, options: &PlayOptions) -> Result<Instance, MixerError> {
        let (instance, default_loop) = {
            let mut state = self.inner.state.lock();
            let default_loop = state.looping;
            match state.instances.iter().find(|i| i.is_stopped()).cloned() {
                Some(instance) => {
                    tracing::debug!("reusing stopped instance");
                    (instance, default_loop)
                }
                None => {
                    let source = state.template.clone_source();
                    let instance = Instance::new(source, Arc::downgrade(&self.inner));
                    state.instances.push(instance.clone());
                    tracing::debug!("created instance (pool size {})", state.instances.len());
                    (instance, default_loop)
                }
            }
        };
        // The pool lock is released before the instance recomputes its
        // effective state, which walks back through this sound.
        instance.start(options, default_loop)?;
        Ok(instance)
    }

    /// Pause every pooled instance, live or stopped.
    pub fn pause(&self) {
        for instance in self.instances() {
            instance.pause();
        }
    }

    /// Resume every pooled instance.
    pub fn resume(&self) {
        for instance in self.instances() {
            instance.resume();
        }
    }

    /// Stop every pooled instance.
    pub fn stop(&self) {
        for instance in self.instances() {
            instance.stop();
        }
    }

    /// The template's default loop flag.
    pub fn is_looping(&self) -> bool {
        self.inner.state.lock().looping
    }

    /// Update the template default and push it to every current instance's
    /// live source immediately.
    pub fn set_looping(&self, looping: bool) {
        self.inner.state.lock().looping = looping;
        for instance in self.instances() {
            instance.set_source_looping(looping);
        }
    }

    /// Number of instances ever created for this sound. The pool is
    /// grow-only; stopped instances are retired in place and reused.
    pub fn instance_count(&self) -> usize {
        self.inner.state.lock().instances.len()
    }

    /// Fully resolved volume: own volume times every applied tag's.
    pub fn effective_volume(&self) -> f32 {
        self.inner.state.lock().taggable.effective_volume()
    }

    /// Fully resolved effect set, force-disabled entries removed.
    pub fn effective_effects(&self) -> EffectMap {
        let mut out = EffectMap::new();
        self.inner.state.lock().taggable.collect_effects(&mut out);
        strip_disabled(&mut out);
        out
    }

    /// Snapshot of the pooled instance handles, taken under the lock so
    /// callers can drive them with the pool lock released.
    fn instances(&self) -> Vec<Instance> {
        self.inner.state.lock().instances.clone()
    }
}

impl SoundInner {
    /// Effective volume as seen by owned instances.
    pub(crate) fn effective_volume(&self) -> f32 {
        self.state.lock().taggable.effective_volume()
    }

    /// Merge this sound's effective effects (Disabled markers included) into
    /// `out`; sits between instance-tag effects and instance overrides.
    pub(crate) fn collect_effective_effects(&self, out: &mut EffectMap) {
        self.state.lock().taggable.collect_effects(out);
    }

    fn notify_instances(&self, notify: impl Fn(&Instance)) {
        let instances = self.state.lock().instances.clone();
        for instance in &instances {
            notify(instance);
        }
    }
}

impl Listener for SoundInner {
    fn id(&self) -> u64 {
        self.id
    }

    fn volume_changed(&self) {
        self.notify_instances(|instance| instance.volume_changed());
    }

    fn effects_changed(&self) {
        self.notify_instances(|instance| instance.effects_changed());
    }
}

impl TagTarget for SoundInner {
    fn with_state<R>(&self, f: impl FnOnce(&mut TaggableState) -> R) -> R {
        f(&mut self.state.lock().taggable)
    }

    fn listener(this: &Arc<Self>) -> Weak<dyn Listener> {
        Arc::downgrade(&(Arc::clone(this) as Arc<dyn Listener>))
    }
}

impl Drop for SoundInner {
    fn drop(&mut self) {
        // Halt transport on every pooled instance; handles the caller still
        // holds stay valid but go silent.
        let instances = std::mem::take(&mut self.state.lock().instances);
        for instance in &instances {
            instance.stop();
        }
    }
}

impl Taggable for Sound {
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

impl PartialEq for Sound {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Sound {}

impl fmt::Debug for Sound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sound").field("id", &self.inner.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::testing::{Call, MockSource};

    #[test]
    fn test_play_creates_instance_and_starts_transport() {
        let (template, registry) = MockSource::template();
        let sound = Sound::new(Box::new(template));

        let instance = sound.play(&PlayOptions::new()).unwrap();
        assert!(!instance.is_stopped());
        assert_eq!(sound.instance_count(), 1);

        let clones = registry.borrow();
        assert_eq!(clones.len(), 1);
        let state = clones[0].borrow();
        assert!(state.playing);
        assert_eq!(state.count(|c| matches!(c, Call::Play)), 1);
        assert_eq!(state.count(|c| matches!(c, Call::SetVolume(_))), 1);
    }

    #[test]
    fn test_pool_grows_only_under_concurrency() {
        let (template, registry) = MockSource::template();
        let sound = Sound::new(Box::new(template));

        let first = sound.play(&PlayOptions::new()).unwrap();
        let second = sound.play(&PlayOptions::new()).unwrap();
        assert_ne!(first, second);
        assert_eq!(sound.instance_count(), 2);

        sound.stop();
        let reused = sound.play(&PlayOptions::new()).unwrap();
        assert_eq!(sound.instance_count(), 2);
        assert!(reused == first || reused == second);
        assert_eq!(registry.borrow().len(), 2); // no third source clone
    }

    #[test]
    fn test_reuse_picks_oldest_stopped_instance() {
        let (template, _registry) = MockSource::template();
        let sound = Sound::new(Box::new(template));

        let first = sound.play(&PlayOptions::new()).unwrap();
        let _second = sound.play(&PlayOptions::new()).unwrap();
        first.stop();

        let reused = sound.play(&PlayOptions::new()).unwrap();
        assert_eq!(reused, first);
    }

    #[test]
    fn test_paused_instance_is_not_reused() {
        let (template, _registry) = MockSource::template();
        let sound = Sound::new(Box::new(template));

        let first = sound.play(&PlayOptions::new()).unwrap();
        first.pause();

        let second = sound.play(&PlayOptions::new()).unwrap();
        assert_ne!(first, second);
        assert_eq!(sound.instance_count(), 2);
    }

    #[test]
    fn test_set_looping_propagates_to_live_sources() {
        let (template, registry) = MockSource::template();
        let sound = Sound::new(Box::new(template));
        sound.play(&PlayOptions::new()).unwrap();

        sound.set_looping(true);
        assert!(sound.is_looping());
        let clones = registry.borrow();
        assert!(clones[0].borrow().looping);
    }

    #[test]
    fn test_loop_default_used_when_options_silent() {
        let (template, registry) = MockSource::template();
        let sound = Sound::with_options(Box::new(template), &PlayOptions::new().looping(true))
            .unwrap();

        sound.play(&PlayOptions::new()).unwrap();
        assert!(registry.borrow()[0].borrow().looping);

        sound.stop();
        sound.play(&PlayOptions::new().looping(false)).unwrap();
        assert!(!registry.borrow()[0].borrow().looping);
    }

    #[test]
    fn test_volume_change_reaches_every_instance() {
        let (template, registry) = MockSource::template();
        let sound = Sound::new(Box::new(template));
        sound.play(&PlayOptions::new()).unwrap();
        sound.play(&PlayOptions::new()).unwrap();

        sound.set_volume(0.5);
        let clones = registry.borrow();
        for clone in clones.iter() {
            assert_eq!(clone.borrow().last_volume(), Some(0.5));
        }
    }

    #[test]
    fn test_drop_stops_instances() {
        let (template, registry) = MockSource::template();
        let sound = Sound::new(Box::new(template));
        sound.play(&PlayOptions::new()).unwrap();
        drop(sound);

        let clones = registry.borrow();
        assert!(!clones[0].borrow().playing);
    }
}
