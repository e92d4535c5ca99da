/// Tag: named grouping node
///
/// A tag carries its own volume and effect overrides like any taggable, plus
/// weak back-references to every object currently using it. Changing a tag
/// fans out through those references so each dependent leaf recomputes only
/// its own effective state; there is no global recompute pass.
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::effect::{overlay, strip_disabled, EffectMap, EffectSetting};
use crate::error::MixerError;
use crate::options::PlayOptions;
use crate::taggable::{self, Listener, TagTarget, Taggable, TaggableState};

pub(crate) struct TagInner {
    id: u64,
    name: String,
    state: Mutex<TaggableState>,
    /// Back-references to members, keyed by entity id. The tag observes
    /// members; it never owns them.
    members: Mutex<Vec<(u64, Weak<dyn Listener>)>>,
}

/// A named, reusable volume/effect modifier applicable to sounds, instances,
/// or other tags.
///
/// `Tag` is a cheap clonable handle; clones refer to the same node and
/// compare equal. Applying a tag to another tag nests groups: the outer
/// tag's settings propagate through the inner one to all of its members.
#[derive(Clone)]
pub struct Tag {
    inner: Arc<TagInner>,
}

impl Tag {
    /// Create a tag with default settings (volume 1, no effects).
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        tracing::debug!("created tag '{}'", name);
        Self {
            inner: Arc::new(TagInner {
                id: taggable::next_id(),
                name,
                state: Mutex::new(TaggableState::new()),
                members: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Create a tag and initialize it from an option record
    /// (volume/tags/effects; playback fields are ignored).
    pub fn with_options(name: impl Into<String>, options: &PlayOptions) -> Result<Self, MixerError> {
        let tag = Self::new(name);
        tag.apply_options(options)?;
        Ok(tag)
    }

    /// The name this tag was created with.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub(crate) fn id(&self) -> u64 {
        self.inner.id
    }

    /// Fully resolved volume: own volume times every ancestor tag's.
    pub fn effective_volume(&self) -> f32 {
        self.inner.state.lock().effective_volume()
    }

    /// Fully resolved effect set, force-disabled entries removed.
    pub fn effective_effects(&self) -> EffectMap {
        let mut out = EffectMap::new();
        self.collect_effective_effects(&mut out);
        strip_disabled(&mut out);
        out
    }

    /// Merge this tag's effective effects (Disabled markers included) into
    /// `out`: ancestors first, own overrides last.
    pub(crate) fn collect_effective_effects(&self, out: &mut EffectMap) {
        let state = self.inner.state.lock();
        state.collect_tag_effects(out);
        overlay(out, &state.effects);
    }

    /// Whether `target` is this tag or one of its ancestors. Used to reject
    /// tag applications that would close a cycle.
    pub(crate) fn reaches(&self, target: u64) -> bool {
        if self.inner.id == target {
            return true;
        }
        let ancestors = self.inner.state.lock().tags.clone();
        ancestors.iter().any(|tag| tag.reaches(target))
    }

    pub(crate) fn register_member(&self, id: u64, member: Weak<dyn Listener>) {
        let mut members = self.inner.members.lock();
        if members.iter().all(|(member_id, _)| *member_id != id) {
            members.push((id, member));
        }
    }

    pub(crate) fn unregister_member(&self, id: u64) {
        self.inner
            .members
            .lock()
            .retain(|(member_id, _)| *member_id != id);
    }

    #[cfg(test)]
    pub(crate) fn member_count(&self) -> usize {
        self.inner.members.lock().len()
    }
}

impl TagInner {
    /// Snapshot the live members and invoke `notify` on each. The member
    /// list lock is released before any callback runs, so members are free
    /// to walk back into the tag graph.
    fn fan_out(&self, notify: impl Fn(&dyn Listener)) {
        let members: Vec<Weak<dyn Listener>> = {
            let mut members = self.members.lock();
            members.retain(|(_, member)| member.strong_count() > 0);
            members.iter().map(|(_, member)| member.clone()).collect()
        };
        tracing::trace!("tag '{}' notifying {} member(s)", self.name, members.len());
        for member in members {
            if let Some(member) = member.upgrade() {
                notify(member.as_ref());
            }
        }
    }
}

impl Listener for TagInner {
    fn id(&self) -> u64 {
        self.id
    }

    fn volume_changed(&self) {
        self.fan_out(|member| member.volume_changed());
    }

    fn effects_changed(&self) {
        self.fan_out(|member| member.effects_changed());
    }
}

impl TagTarget for TagInner {
    fn with_state<R>(&self, f: impl FnOnce(&mut TaggableState) -> R) -> R {
        f(&mut self.state.lock())
    }

    fn listener(this: &Arc<Self>) -> Weak<dyn Listener> {
        Arc::downgrade(&(Arc::clone(this) as Arc<dyn Listener>))
    }
}

impl Taggable for Tag {
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

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Tag {}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tag")
            .field("name", &self.inner.name)
            .field("id", &self.inner.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tag_handles_compare_by_identity() {
        let a = Tag::new("music");
        let b = Tag::new("music");
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_effective_volume_multiplies_through_ancestors() {
        let master = Tag::new("master");
        let music = Tag::new("music");
        master.set_volume(0.5);
        music.set_volume(0.5);
        music.tag(&[master.clone()]).unwrap();

        assert_eq!(music.effective_volume(), 0.25);
        assert_eq!(music.volume(), 0.5); // own volume unchanged
    }

    #[test]
    fn test_untag_restores_pre_tag_volume() {
        let master = Tag::new("master");
        master.set_volume(0.5);

        let music = Tag::new("music");
        music.set_volume(0.8);
        let before = music.effective_volume();

        music.tag(&[master.clone()]).unwrap();
        assert_ne!(music.effective_volume(), before);

        music.untag(&[master]);
        assert_eq!(music.effective_volume(), before);
    }

    #[test]
    fn test_tag_is_idempotent() {
        let master = Tag::new("master");
        master.set_volume(0.5);

        let music = Tag::new("music");
        music.tag(&[master.clone()]).unwrap();
        music.tag(&[master.clone()]).unwrap();

        assert_eq!(music.effective_volume(), 0.5); // applied once, not twice
        assert_eq!(master.member_count(), 1);
    }

    #[test]
    fn test_untag_unknown_tag_is_noop() {
        let master = Tag::new("master");
        let music = Tag::new("music");
        music.untag(&[master]);
        assert_eq!(music.effective_volume(), 1.0);
    }

    #[test]
    fn test_self_tag_is_rejected() {
        let music = Tag::new("music");
        let err = music.tag(&[music.clone()]).unwrap_err();
        assert!(matches!(err, MixerError::CyclicTagGraph { .. }));
    }

    #[test]
    fn test_indirect_cycle_is_rejected() {
        let a = Tag::new("a");
        let b = Tag::new("b");
        let c = Tag::new("c");
        b.tag(&[a.clone()]).unwrap();
        c.tag(&[b.clone()]).unwrap();

        let err = a.tag(&[c.clone()]).unwrap_err();
        assert!(matches!(err, MixerError::CyclicTagGraph { tag } if tag == "c"));
    }

    #[test]
    fn test_rejected_batch_attaches_nothing() {
        let quiet = Tag::new("quiet");
        quiet.set_volume(0.5);

        let a = Tag::new("a");
        let b = Tag::new("b");
        b.tag(&[a.clone()]).unwrap();

        // The second tag closes a cycle; the whole batch must be rejected,
        // including the valid first tag.
        let err = a.tag(&[quiet.clone(), b.clone()]).unwrap_err();
        assert!(matches!(err, MixerError::CyclicTagGraph { tag } if tag == "b"));
        assert_eq!(a.effective_volume(), 1.0);
        assert_eq!(quiet.member_count(), 0);
    }

    #[test]
    fn test_rejected_apply_options_mutates_nothing() {
        let a = Tag::new("a");
        let b = Tag::new("b");
        b.tag(&[a.clone()]).unwrap();
        a.set_volume(0.5);
        a.set_effect("reverb", EffectSetting::Enabled);

        let err = a
            .apply_options(&PlayOptions::new().volume(2.0).tag(&b))
            .unwrap_err();
        assert!(matches!(err, MixerError::CyclicTagGraph { .. }));

        // Prior volume, effects and membership all survive the failed call.
        assert_eq!(a.volume(), 0.5);
        assert_eq!(a.effect("reverb"), Some(EffectSetting::Enabled));
        assert_eq!(b.effective_volume(), 0.5);
    }

    #[test]
    fn test_negative_volume_clamps_to_zero() {
        let music = Tag::new("music");
        music.set_volume(-1.0);
        assert_eq!(music.volume(), 0.0);
    }

    #[test]
    fn test_effect_precedence_own_overrides_ancestor() {
        let room = Tag::new("room");
        room.set_effect("reverb", EffectSetting::Params(json!({ "decay": 1.0 })));

        let voice = Tag::new("voice");
        voice.tag(&[room.clone()]).unwrap();
        voice.set_effect("reverb", EffectSetting::Params(json!({ "decay": 4.0 })));

        let effects = voice.effective_effects();
        assert_eq!(
            effects["reverb"],
            EffectSetting::Params(json!({ "decay": 4.0 }))
        );
    }

    #[test]
    fn test_explicit_disable_wins_over_inherited_enable() {
        let room = Tag::new("room");
        room.set_effect("echo", EffectSetting::Enabled);

        let voice = Tag::new("voice");
        voice.tag(&[room.clone()]).unwrap();
        voice.set_effect("echo", EffectSetting::Disabled);

        assert!(!voice.effective_effects().contains_key("echo"));
    }

    #[test]
    fn test_conflicting_tags_resolve_to_last_applied() {
        let hall = Tag::new("hall");
        hall.set_effect("reverb", EffectSetting::Params(json!({ "decay": 1.0 })));
        let cave = Tag::new("cave");
        cave.set_effect("reverb", EffectSetting::Params(json!({ "decay": 9.0 })));

        let voice = Tag::new("voice");
        voice.tag(&[hall.clone(), cave.clone()]).unwrap();

        // Deterministic but unspecified across tags: the stable container
        // order means the last-applied tag is observed.
        let effects = voice.effective_effects();
        assert_eq!(
            effects["reverb"],
            EffectSetting::Params(json!({ "decay": 9.0 }))
        );
    }

    #[test]
    fn test_remove_effect_reveals_inherited_setting() {
        let room = Tag::new("room");
        room.set_effect("reverb", EffectSetting::Enabled);

        let voice = Tag::new("voice");
        voice.tag(&[room.clone()]).unwrap();
        voice.set_effect("reverb", EffectSetting::Disabled);
        assert!(!voice.effective_effects().contains_key("reverb"));

        voice.remove_effect("reverb");
        assert_eq!(voice.effective_effects()["reverb"], EffectSetting::Enabled);
    }

    #[test]
    fn test_apply_options_replaces_membership() {
        let a = Tag::new("a");
        let b = Tag::new("b");
        a.set_volume(0.5);
        b.set_volume(0.25);

        let voice = Tag::new("voice");
        voice.tag(&[a.clone()]).unwrap();
        assert_eq!(voice.effective_volume(), 0.5);

        voice
            .apply_options(&PlayOptions::new().volume(2.0).tag(&b))
            .unwrap();
        assert_eq!(voice.effective_volume(), 0.5); // 2.0 * 0.25, a detached
        assert_eq!(a.member_count(), 0);
        assert_eq!(b.member_count(), 1);
    }

    #[test]
    fn test_dropped_member_is_pruned_on_fan_out() {
        let master = Tag::new("master");
        {
            let child = Tag::new("child");
            child.tag(&[master.clone()]).unwrap();
            assert_eq!(master.member_count(), 1);
        }
        master.set_volume(0.5); // fan-out prunes the dead back-reference
        assert_eq!(master.member_count(), 0);
    }
}
