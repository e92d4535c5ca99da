/// Rodio-backed audio source
///
/// Preloads audio bytes into memory, verifies they decode, and plays them
/// through one `Sink` per instance. Cloning a source shares the bytes and
/// the output stream but nothing mutable.
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};

use crate::effect::EffectSetting;
use crate::error::BackendError;
use crate::source::AudioSource;

/// Decode-verified audio bytes shared by every instance of a sound.
#[derive(Clone)]
pub struct PreloadedAudio {
    data: Arc<Vec<u8>>,
}

impl PreloadedAudio {
    /// Read an audio file into memory and verify it decodes.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BackendError> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|source| BackendError::LoadFailed {
            path: path.display().to_string(),
            source,
        })?;
        tracing::info!(
            "preloaded audio file: {} ({} bytes)",
            path.display(),
            data.len()
        );
        Self::from_bytes(data)
    }

    /// Wrap already-loaded audio bytes, verifying they decode.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, BackendError> {
        // Fail at load time, not at first playback.
        let cursor = Cursor::new(data.clone());
        Decoder::new(cursor).map_err(BackendError::DecodeFailed)?;
        Ok(Self {
            data: Arc::new(data),
        })
    }

    /// Size of the preloaded data in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    // rodio's Decoder requires owned data with a 'static lifetime, so each
    // decoder gets its own copy of the bytes.
    fn decoder(&self) -> Result<Decoder<Cursor<Vec<u8>>>, BackendError> {
        Decoder::new(Cursor::new((*self.data).clone())).map_err(BackendError::DecodeFailed)
    }
}

/// [`AudioSource`] implementation over a rodio `Sink`.
///
/// The sink is created lazily on first `play`, so sources can be
/// constructed, cloned, and configured without an output device until
/// transport actually starts. Named effects are accepted but not realized:
/// rodio sinks expose no per-effect hooks, so `apply_effect` records the
/// request at debug level and moves on.
pub struct RodioSource {
    audio: PreloadedAudio,
    /// Keeps the output device alive when this source owns it; clones share
    /// the same stream.
    stream: Option<Arc<OutputStream>>,
    handle: OutputStreamHandle,
    sink: Option<Sink>,
    volume: f32,
    pitch: f32,
    looping: bool,
    start_offset: f64,
}

impl RodioSource {
    /// Open the default output device and create a template source over it.
    pub fn open_default(audio: PreloadedAudio) -> Result<Self, BackendError> {
        let (stream, handle) =
            OutputStream::try_default().map_err(BackendError::StreamInitFailed)?;
        Ok(Self::build(audio, Some(Arc::new(stream)), handle))
    }

    /// Create a template source over a caller-managed output stream.
    pub fn with_handle(audio: PreloadedAudio, handle: OutputStreamHandle) -> Self {
        Self::build(audio, None, handle)
    }

    fn build(
        audio: PreloadedAudio,
        stream: Option<Arc<OutputStream>>,
        handle: OutputStreamHandle,
    ) -> Self {
        Self {
            audio,
            stream,
            handle,
            sink: None,
            volume: 1.0,
            pitch: 1.0,
            looping: false,
            start_offset: 0.0,
        }
    }
}

impl AudioSource for RodioSource {
    fn clone_source(&self) -> Box<dyn AudioSource> {
        tracing::debug!("cloning rodio source ({} bytes shared)", self.audio.len());
        Box::new(Self::build(
            self.audio.clone(),
            self.stream.clone(),
            self.handle.clone(),
        ))
    }

    fn play(&mut self) {
        if self.sink.is_none() {
            match Sink::try_new(&self.handle) {
                Ok(sink) => self.sink = Some(sink),
                Err(err) => {
                    tracing::warn!("failed to create playback sink: {err}");
                    return;
                }
            }
        }
        let Some(sink) = self.sink.as_ref() else {
            return;
        };

        if sink.empty() {
            let decoder = match self.audio.decoder() {
                Ok(decoder) => decoder,
                Err(err) => {
                    tracing::warn!("failed to decode preloaded audio: {err}");
                    return;
                }
            };

            // Each adaptor returns a different type, so the chain is built
            // through dynamic dispatch.
            let mut source: Box<dyn Source<Item = i16> + Send> = Box::new(decoder);
            if self.start_offset > 0.0 {
                source = Box::new(source.skip_duration(Duration::from_secs_f64(self.start_offset)));
            }
            if self.looping {
                source = Box::new(source.repeat_infinite());
            }

            sink.append(source);
            sink.set_volume(self.volume);
            sink.set_speed(self.pitch);
        }
        sink.play();
    }

    fn pause(&mut self) {
        if let Some(sink) = &self.sink {
            sink.pause();
        }
    }

    fn stop(&mut self) {
        if let Some(sink) = &self.sink {
            sink.stop();
        }
    }

    fn seek(&mut self, seconds: f64) {
        let seconds = seconds.max(0.0);
        self.start_offset = seconds;
        if let Some(sink) = &self.sink {
            if !sink.empty() {
                if let Err(err) = sink.try_seek(Duration::from_secs_f64(seconds)) {
                    tracing::debug!("seek not supported by current source: {err}");
                }
            }
        }
    }

    fn is_playing(&self) -> bool {
        self.sink
            .as_ref()
            .map(|sink| !sink.empty() && !sink.is_paused())
            .unwrap_or(false)
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
        if let Some(sink) = &self.sink {
            sink.set_volume(volume);
        }
    }

    fn set_pitch(&mut self, pitch: f32) {
        self.pitch = pitch;
        if let Some(sink) = &self.sink {
            sink.set_speed(pitch);
        }
    }

    fn is_looping(&self) -> bool {
        self.looping
    }

    fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
        if self.is_playing() {
            // An already-appended source keeps its repeat behavior; the flag
            // applies from the next transport start.
            tracing::debug!("loop change takes effect on next play");
        }
    }

    fn apply_effect(&mut self, name: &str, setting: &EffectSetting) {
        tracing::debug!(
            "effect '{}' ({}) not realized by rodio backend",
            name,
            if setting.is_disabled() { "disable" } else { "enable" }
        );
    }
}
