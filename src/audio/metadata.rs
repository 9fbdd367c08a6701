//! Audio file tag extraction using the `lofty` crate.

use std::path::Path;

use {
    lofty::{
        error::LoftyError,
        prelude::{AudioFile, ItemKey, TaggedFileExt},
        probe::Probe,
        tag::Accessor,
    },
    serde::{Deserialize, Serialize},
    thiserror::Error,
};

/// Error type for metadata extraction operations.
#[derive(Error, Debug)]
pub enum MetadataError {
    /// Failed to read or parse the audio file.
    #[error("Failed to read audio file: {0}")]
    ReadError(#[from] LoftyError),
}

/// Tag values and duration of one audio file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SongTags {
    /// Track title.
    pub title: Option<String>,
    /// Track artist.
    pub artist: Option<String>,
    /// Album name.
    pub album: Option<String>,
    /// Duration in milliseconds.
    pub duration_ms: u64,
    /// Track number within the album.
    pub track_number: Option<u32>,
    /// Release year.
    pub year: Option<u32>,
    /// Genre.
    pub genre: Option<String>,
}

/// Reads tags from audio files.
///
/// # Examples
///
/// ```no_run
/// use tapedeck::audio::metadata::TagReader;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let tags = TagReader::read("/path/to/song.flac")?;
///     println!("Title: {:?}", tags.title);
///     Ok(())
/// }
/// ```
pub struct TagReader;

impl TagReader {
    /// Reads the primary tag and the duration of an audio file.
    ///
    /// Files without any tag still yield their duration.
    ///
    /// # Errors
    ///
    /// Returns `MetadataError` if the file cannot be opened or parsed.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<SongTags, MetadataError> {
        let tagged_file = Probe::open(path.as_ref())?.read()?;
        let duration_ms = u64::try_from(tagged_file.properties().duration().as_millis())
            .unwrap_or(u64::MAX);

        let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) else {
            return Ok(SongTags {
                duration_ms,
                ..SongTags::default()
            });
        };

        let track_number = tag.track().or_else(|| {
            tag.get_string(&ItemKey::TrackNumber)
                .and_then(parse_track_number)
        });

        Ok(SongTags {
            title: non_blank(tag.title().as_deref()),
            artist: non_blank(tag.artist().as_deref()),
            album: non_blank(tag.album().as_deref()),
            duration_ms,
            track_number,
            year: tag.year(),
            genre: non_blank(tag.genre().as_deref()),
        })
    }
}

/// Parses `"7"` or `"7/12"` into `7`.
pub fn parse_track_number(raw: &str) -> Option<u32> {
    raw.split('/').next()?.trim().parse().ok()
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
