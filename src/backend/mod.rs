/// Bundled audio-source backend
///
/// Default [`AudioSource`] implementation on top of rodio. Audio data is
/// preloaded into memory once and shared; every instance gets its own sink
/// over the shared bytes.
///
/// [`AudioSource`]: crate::AudioSource
mod rodio;

pub use self::rodio::{PreloadedAudio, RodioSource};
