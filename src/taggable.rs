/// Shared taggable behavior
///
/// Every entity in the mixing layer (tag, sound, instance) carries the same
/// base state: an own volume, a map of own effect overrides, and an ordered
/// list of applied tags. This module holds that state, the recursive
/// effective-value computations, and the generic tag/untag/option plumbing
/// the concrete types delegate to.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::effect::{overlay, EffectMap, EffectSetting};
use crate::error::MixerError;
use crate::options::PlayOptions;
use crate::tag::Tag;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-unique entity id. Ids give tags a stable key for
/// member back-references without holding strong ownership.
pub(crate) fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Change-notification protocol.
///
/// A mutation anywhere in the tag graph reaches dependents through these two
/// callbacks. Fan-out is synchronous and inline: the traversal completes
/// before the mutating call returns.
pub(crate) trait Listener {
    fn id(&self) -> u64;

    /// The receiver's effective volume may have changed; recompute and
    /// propagate (tags fan out to members, instances push to their source).
    fn volume_changed(&self);

    /// The receiver's effective effect set may have changed.
    fn effects_changed(&self);
}

/// Base state composed into every taggable entity.
#[derive(Debug)]
pub(crate) struct TaggableState {
    pub(crate) volume: f32,
    pub(crate) effects: EffectMap,
    pub(crate) tags: Vec<Tag>,
}

impl TaggableState {
    pub(crate) fn new() -> Self {
        Self {
            volume: 1.0,
            effects: EffectMap::new(),
            tags: Vec::new(),
        }
    }

    /// Own volume times the effective volume of every applied tag.
    /// Multiplication commutes, so tag order is irrelevant here. Recursion
    /// depth is bounded by tag-graph depth; `tag()` rejects cycles up front.
    pub(crate) fn effective_volume(&self) -> f32 {
        self.tags
            .iter()
            .fold(self.volume, |volume, tag| volume * tag.effective_volume())
    }

    /// Merge every applied tag's effective effect map into `out`, in applied
    /// order. When several tags define the same name the last-applied tag
    /// wins; that order is stable but not part of the contract.
    pub(crate) fn collect_tag_effects(&self, out: &mut EffectMap) {
        for tag in &self.tags {
            tag.collect_effective_effects(out);
        }
    }

    /// Tag-derived effects overlaid with this object's own overrides.
    /// Disabled entries are kept; callers strip them from the final set.
    pub(crate) fn collect_effects(&self, out: &mut EffectMap) {
        self.collect_tag_effects(out);
        overlay(out, &self.effects);
    }
}

/// Internal access the generic operations need from a concrete entity:
/// its notification identity plus scoped access to the base state.
pub(crate) trait TagTarget: Listener {
    fn with_state<R>(&self, f: impl FnOnce(&mut TaggableState) -> R) -> R
    where
        Self: Sized;

    /// Weak handle a tag stores as the member back-reference. Implemented at
    /// each concrete type, where the unsizing to `dyn Listener` is legal.
    fn listener(this: &Arc<Self>) -> Weak<dyn Listener>
    where
        Self: Sized;
}

/// Public operations shared by [`Tag`], [`Sound`] and [`Instance`].
///
/// `volume`/`effect` read *own* (not effective) values; the effective
/// accessors live on the concrete types. Mutators notify dependents once per
/// call, however many tags or fields the call touched.
///
/// [`Sound`]: crate::Sound
/// [`Instance`]: crate::Instance
pub trait Taggable {
    /// This object's own volume multiplier.
    fn volume(&self) -> f32;

    /// Set the own volume multiplier (negative values clamp to zero) and
    /// notify dependents.
    fn set_volume(&self, volume: f32);

    /// Apply each given tag, skipping tags already applied. Fires one
    /// volume-changed and one effects-changed notification for the whole
    /// batch. Fails without mutating further if an application would make
    /// this object an ancestor of itself.
    fn tag(&self, tags: &[Tag]) -> Result<(), MixerError>;

    /// Remove each given tag; tags not currently applied are skipped.
    fn untag(&self, tags: &[Tag]);

    /// This object's own override for `name`, if any.
    fn effect(&self, name: &str) -> Option<EffectSetting>;

    /// Set an own effect override and notify dependents.
    fn set_effect(&self, name: &str, setting: EffectSetting);

    /// Clear an own effect override, making inherited settings visible
    /// again. Clearing an absent override is a no-op.
    fn remove_effect(&self, name: &str);

    /// Replace volume, tag membership and own effects wholesale from an
    /// option record, then fire one volume-changed and one effects-changed
    /// notification. Fields absent from the record reset to their defaults.
    fn apply_options(&self, options: &PlayOptions) -> Result<(), MixerError>;
}

pub(crate) fn own_volume<T: TagTarget>(this: &T) -> f32 {
    this.with_state(|state| state.volume)
}

pub(crate) fn set_own_volume<T: TagTarget>(this: &T, volume: f32) {
    let volume = volume.max(0.0);
    this.with_state(|state| state.volume = volume);
    this.volume_changed();
}

pub(crate) fn own_effect<T: TagTarget>(this: &T, name: &str) -> Option<EffectSetting> {
    this.with_state(|state| state.effects.get(name).cloned())
}

pub(crate) fn set_own_effect<T: TagTarget>(this: &T, name: &str, setting: EffectSetting) {
    this.with_state(|state| state.effects.insert(name.to_string(), setting));
    this.effects_changed();
}

pub(crate) fn remove_own_effect<T: TagTarget>(this: &T, name: &str) {
    this.with_state(|state| state.effects.remove(name));
    this.effects_changed();
}

pub(crate) fn apply_tags<T>(this: &Arc<T>, tags: &[Tag]) -> Result<(), MixerError>
where
    T: TagTarget + 'static,
{
    attach_tags(this, tags)?;
    this.volume_changed();
    this.effects_changed();
    Ok(())
}

pub(crate) fn remove_tags<T>(this: &Arc<T>, tags: &[Tag])
where
    T: TagTarget + 'static,
{
    let mut any_removed = false;
    for tag in tags {
        let removed = this.with_state(|state| {
            let before = state.tags.len();
            state.tags.retain(|applied| applied.id() != tag.id());
            state.tags.len() != before
        });
        if removed {
            tag.unregister_member(this.id());
            any_removed = true;
        }
    }
    // A call that removed nothing is a full no-op; nothing to propagate.
    if any_removed {
        this.volume_changed();
        this.effects_changed();
    }
}

pub(crate) fn apply_option_state<T>(this: &Arc<T>, options: &PlayOptions) -> Result<(), MixerError>
where
    T: TagTarget + 'static,
{
    // Reject up front so a failed call leaves no partial state behind.
    validate_tags(this.id(), &options.tags)?;

    // Membership is fully replaced: detach from every current tag first.
    let previous: Vec<Tag> = this.with_state(|state| std::mem::take(&mut state.tags));
    for tag in &previous {
        tag.unregister_member(this.id());
    }

    this.with_state(|state| {
        state.volume = options.volume.max(0.0);
        state.effects = options.effects.clone();
    });
    attach_tags(this, &options.tags)?;

    this.volume_changed();
    this.effects_changed();
    Ok(())
}

/// Attach tags and register back-references without notifying; callers fire
/// the batched notifications themselves. The whole batch is validated before
/// any tag is attached, so a rejected call mutates nothing.
fn attach_tags<T>(this: &Arc<T>, tags: &[Tag]) -> Result<(), MixerError>
where
    T: TagTarget + 'static,
{
    validate_tags(this.id(), tags)?;
    for tag in tags {
        let already = this.with_state(|state| {
            state.tags.iter().any(|applied| applied.id() == tag.id())
        });
        if already {
            continue;
        }
        tag.register_member(this.id(), T::listener(this));
        this.with_state(|state| state.tags.push(tag.clone()));
    }
    Ok(())
}

/// Reject any tag from which `target` is already reachable; applying such a
/// tag would close a cycle.
fn validate_tags(target: u64, tags: &[Tag]) -> Result<(), MixerError> {
    for tag in tags {
        if tag.reaches(target) {
            return Err(MixerError::CyclicTagGraph {
                tag: tag.name().to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = next_id();
        let b = next_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_effective_volume_without_tags_is_own_volume() {
        let mut state = TaggableState::new();
        state.volume = 0.4;
        assert_eq!(state.effective_volume(), 0.4);
    }

    #[test]
    fn test_collect_effects_own_overrides_win() {
        let tag = Tag::new("ambient");
        tag.set_effect("reverb", EffectSetting::Enabled);

        let mut state = TaggableState::new();
        state.tags.push(tag);
        state
            .effects
            .insert("reverb".to_string(), EffectSetting::Disabled);

        let mut out = EffectMap::new();
        state.collect_effects(&mut out);
        assert_eq!(out["reverb"], EffectSetting::Disabled);
    }
}
