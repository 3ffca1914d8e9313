//! The reader plugin contract (§6) and a Symphonia-backed implementation.
//!
//! Container readers are, per the design notes, internal trait objects
//! rather than separately shipped native plugins — only the output-plugin
//! ABI crosses a real dynamic-loading boundary. Symphonia already owns
//! demuxing for every format the teacher's `audio-player::decode` module
//! probes, so `SymphoniaReader` wraps a `Box<dyn FormatReader>` and turns
//! its packets into `gap-engine` packets carrying coded bytes.

use symphonia::core::codecs::CodecParameters;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::EngineError;
use crate::packet::Packet;

/// Outcome of one `process` call on a reader plugin.
pub enum ReadOutcome {
    /// `packet` (passed in by the caller, already acquired from the pool)
    /// was filled with the next coded packet.
    Ok,
    /// End of the logical stream. `packet` was not touched; the caller
    /// returns it to the pool.
    Done,
    /// The reader surfaced a playlist; call `redirect` to retrieve it.
    /// `packet` was not touched.
    Redirect,
}

/// External collaborator contract: resolves a byte-source, probes the
/// container, and yields coded packets.
///
/// `process` takes an already-acquired `packet` rather than pulling one
/// from the pool itself, matching `spec.md` §4.2's control flow literally:
/// the input stage acquires a packet under the pool's back-pressure
/// contract *before* calling into the reader, so a reader never has to
/// choose between discarding an already-demuxed container packet and
/// blocking indefinitely waiting for a free buffer.
pub trait ReaderPlugin: Send {
    /// Human-readable container/format tag, used for status reporting.
    fn format_name(&self) -> &str;
    fn can_seek(&self) -> bool;
    /// Reposition to `frame_position`. Returns `false` if unsupported or failed.
    fn seek(&mut self, frame_position: u64) -> bool;
    /// Fill `packet` with the next coded packet, or report end-of-stream /
    /// a redirect.
    fn process(&mut self, packet: &mut Packet) -> Result<ReadOutcome, EngineError>;
    /// Fill `out` with redirect target URLs; only meaningful right after a
    /// `Redirect` outcome.
    fn redirect(&mut self, out: &mut Vec<String>) -> bool;
    /// Codec parameters for the stream's single decodable track, available
    /// once the first packet has been produced.
    fn codec_params(&self) -> Option<&CodecParameters>;
    /// Total frame count of the track, if known from container metadata.
    fn total_frames(&self) -> Option<u64>;
}

/// A `ReaderPlugin` backed by Symphonia's format probe + `FormatReader`.
pub struct SymphoniaReader {
    format: Box<dyn FormatReader>,
    track_id: u32,
    format_name: &'static str,
    total_frames: Option<u64>,
}

impl SymphoniaReader {
    /// Probe `source` (an already-opened byte source) and construct a reader
    /// for its first decodable track, optionally seeking to `start_frame`
    /// before returning.
    pub fn open(
        source: Box<dyn symphonia::core::io::MediaSource>,
        extension_hint: Option<&str>,
        start_frame: Option<u64>,
    ) -> Result<Self, EngineError> {
        let mss = MediaSourceStream::new(source, Default::default());
        let mut hint = Hint::new();
        if let Some(ext) = extension_hint {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| EngineError::OpenFailed(e.to_string()))?;

        let mut format = probed.format;
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
            .ok_or_else(|| EngineError::OpenFailed("no decodable track".into()))?;
        let track_id = track.id;
        let total_frames = track.codec_params.n_frames;
        let format_name = format_name_from_codec(&track.codec_params);

        if let Some(start) = start_frame {
            let _ = format.seek(
                symphonia::core::formats::SeekMode::Accurate,
                symphonia::core::formats::SeekTo::TimeStamp { ts: start, track_id },
            );
        }

        Ok(SymphoniaReader {
            format,
            track_id,
            format_name,
            total_frames,
        })
    }
}

impl ReaderPlugin for SymphoniaReader {
    fn format_name(&self) -> &str {
        self.format_name
    }

    fn can_seek(&self) -> bool {
        true
    }

    fn seek(&mut self, frame_position: u64) -> bool {
        self.format
            .seek(
                symphonia::core::formats::SeekMode::Accurate,
                symphonia::core::formats::SeekTo::TimeStamp {
                    ts: frame_position,
                    track_id: self.track_id,
                },
            )
            .is_ok()
    }

    fn process(&mut self, packet: &mut Packet) -> Result<ReadOutcome, EngineError> {
        loop {
            match self.format.next_packet() {
                Ok(coded) => {
                    if coded.track_id() != self.track_id {
                        continue;
                    }
                    let data = coded.data.as_ref();
                    if data.len() > packet.capacity() {
                        return Err(EngineError::OpenFailed(
                            "coded packet exceeds pool packet capacity".into(),
                        ));
                    }
                    packet.write(data);
                    packet.stream_position = coded.ts();
                    packet.stream_length = self.total_frames;
                    return Ok(ReadOutcome::Ok);
                }
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(ReadOutcome::Done);
                }
                Err(SymphoniaError::ResetRequired) => return Ok(ReadOutcome::Done),
                Err(e) => return Err(EngineError::OpenFailed(e.to_string())),
            }
        }
    }

    fn redirect(&mut self, _out: &mut Vec<String>) -> bool {
        false
    }

    fn codec_params(&self) -> Option<&CodecParameters> {
        self.format
            .tracks()
            .iter()
            .find(|t| t.id == self.track_id)
            .map(|t| &t.codec_params)
    }

    fn total_frames(&self) -> Option<u64> {
        self.total_frames
    }
}

fn format_name_from_codec(params: &CodecParameters) -> &'static str {
    use symphonia::core::codecs::*;
    match params.codec {
        CODEC_TYPE_FLAC => "FLAC",
        CODEC_TYPE_MP3 => "MP3",
        CODEC_TYPE_VORBIS => "OGG",
        CODEC_TYPE_AAC => "AAC",
        CODEC_TYPE_ALAC => "ALAC",
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S32LE => "WAV",
        _ => "UNKNOWN",
    }
}

/// Marker trait bound used by the input stage to share a reader across a
/// thread boundary without committing to `Arc<Mutex<_>>` at every call site.
pub type BoxedReader = Box<dyn ReaderPlugin>;

/// Helper used by tests and by `gap-cli` to build a file-backed reader.
pub fn open_reader_from_path(path: &std::path::Path) -> Result<BoxedReader, EngineError> {
    let file = std::fs::File::open(path).map_err(|e| EngineError::OpenFailed(e.to_string()))?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_string());
    let source: Box<dyn symphonia::core::io::MediaSource> = Box::new(file);
    Ok(Box::new(SymphoniaReader::open(source, ext.as_deref(), None)?))
}

/// Resolve a URL to a byte-source and open a reader on it, per the input
/// byte-source contract of `spec.md` §6: `http://`/`https://` URLs are
/// fetched with buffered range requests (`http_source::HttpRangeSource`),
/// everything else (a bare path, or a `file://` URL) is opened as a local
/// file. This is the input stage's "resolve the byte-source" step of §4.2.
pub fn open_reader(url: &str) -> Result<BoxedReader, EngineError> {
    if let Some(ext) = url_extension_hint(url) {
        if url.starts_with("http://") || url.starts_with("https://") {
            let source: Box<dyn symphonia::core::io::MediaSource> = Box::new(
                crate::http_source::HttpRangeSource::new(url.to_string(), Default::default()),
            );
            return Ok(Box::new(SymphoniaReader::open(source, Some(&ext), None)?));
        }
    } else if url.starts_with("http://") || url.starts_with("https://") {
        let source: Box<dyn symphonia::core::io::MediaSource> = Box::new(
            crate::http_source::HttpRangeSource::new(url.to_string(), Default::default()),
        );
        return Ok(Box::new(SymphoniaReader::open(source, None, None)?));
    }
    let path = url.strip_prefix("file://").unwrap_or(url);
    open_reader_from_path(std::path::Path::new(path))
}

fn url_extension_hint(url: &str) -> Option<String> {
    let tail = url.split(['?', '#']).next().unwrap_or(url);
    let file = tail.rsplit('/').next().unwrap_or(tail);
    let mut parts = file.rsplit('.');
    let ext = parts.next()?;
    if parts.next().is_some() {
        Some(ext.to_ascii_lowercase())
    } else {
        None
    }
}

#[cfg(test)]
mod url_tests {
    use super::*;

    #[test]
    fn url_extension_hint_handles_query_string() {
        assert_eq!(
            url_extension_hint("https://example.com/track.flac?x=1"),
            Some("flac".to_string())
        );
    }

    #[test]
    fn url_extension_hint_none_without_dot() {
        assert_eq!(url_extension_hint("https://example.com/track"), None);
    }
}
