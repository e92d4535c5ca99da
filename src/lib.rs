//! tagmix
//!
//! Hierarchical mixing control for playable audio: group sounds and live
//! playback instances under tags that propagate volume multipliers and
//! effect settings down to every member, with per-object overrides.
//!
//! ## Architecture
//!
//! ```text
//! Tag ("master")
//!   └── Tag ("music")          volume/effect changes fan out through
//!         ├── Sound (theme)    back-references; each affected instance
//!         │     ├── Instance   recomputes its own effective state and
//!         │     └── Instance   pushes it to the underlying audio source
//!         └── Sound (stinger)
//!               └── Instance
//! ```
//!
//! Effective volume is the product of an object's own volume and every
//! ancestor tag's (instances also multiply in their owning sound's).
//! Effective effects merge with override precedence instance > sound > tags;
//! an explicit disable masks any inherited enable of the same name.
//!
//! The layer is synchronous and single-threaded: notification fan-out is a
//! direct inline traversal that completes before the mutating call returns.
//! Handles are cheap clones and compare by identity.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tagmix::{PlayOptions, PreloadedAudio, RodioSource, Sound, Tag, Taggable};
//!
//! let music = Tag::new("music");
//!
//! let audio = PreloadedAudio::load("theme.mp3")?;
//! let template = RodioSource::open_default(audio)?;
//! let theme = Sound::with_options(
//!     Box::new(template),
//!     &PlayOptions::new().tag(&music).looping(true),
//! )?;
//!
//! theme.play(&PlayOptions::new())?;
//!
//! // Reaches every live instance tagged under "music".
//! music.set_volume(0.5);
//! ```

pub mod backend;
pub mod effect;
pub mod error;
pub mod instance;
pub mod options;
pub mod sound;
pub mod source;
pub mod tag;
pub mod taggable;

// Re-export commonly used types
pub use backend::{PreloadedAudio, RodioSource};
pub use effect::{EffectMap, EffectSetting};
pub use error::{BackendError, MixerError};
pub use instance::Instance;
pub use options::PlayOptions;
pub use sound::Sound;
pub use source::AudioSource;
pub use tag::Tag;
pub use taggable::Taggable;
