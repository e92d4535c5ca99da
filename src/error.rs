use thiserror::Error;

/// Library errors using thiserror for structured error handling.
///
/// The mixing layer itself is total over its stated input domains: unknown
/// effect names pass through to the source, and removing a tag or effect that
/// was never applied is a silent no-op. The only core failure is an attempt
/// to build a cyclic tag graph, which is rejected up front instead of being
/// allowed to recurse without bound during propagation.

#[derive(Error, Debug)]
pub enum MixerError {
    #[error("applying tag '{tag}' would create a cycle in the tag graph")]
    CyclicTagGraph { tag: String },
}

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to load audio file: {path}")]
    LoadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode audio data")]
    DecodeFailed(#[source] rodio::decoder::DecoderError),

    #[error("failed to initialize audio output stream")]
    StreamInitFailed(#[source] rodio::StreamError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_error_display() {
        let err = MixerError::CyclicTagGraph {
            tag: "music".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "applying tag 'music' would create a cycle in the tag graph"
        );
    }

    #[test]
    fn test_error_source_chain() {
        use std::io;

        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let load_err = BackendError::LoadFailed {
            path: "/music/theme.mp3".to_string(),
            source: io_err,
        };

        assert!(load_err.source().is_some());
        assert_eq!(
            load_err.to_string(),
            "failed to load audio file: /music/theme.mp3"
        );
    }
}
