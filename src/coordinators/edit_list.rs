use super::Coordinator;
use crate::boxes::BoxHeader;
use crate::payload::{Detail, ParsedPayload};
use std::collections::HashMap;

/// Timescales an `elst` decoder needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EditListEnv {
    pub movie_timescale: Option<u32>,
    pub media_timescale: Option<u32>,
}

#[derive(Debug, Default)]
struct TrackContext {
    track_id: Option<u32>,
    media_timescale: Option<u32>,
}

/// Tracks the movie timescale and per-track media timescales.
///
/// Media timescales are cached by track id after the track closes, so a
/// later `trak` reusing the id sees the value even before its own `mdhd`.
#[derive(Debug, Default)]
pub struct EditListCoordinator {
    movie_timescale: Option<u32>,
    tracks: Vec<TrackContext>,
    cached_media_timescales: HashMap<u32, u32>,
}

impl EditListCoordinator {
    pub fn movie_timescale(&self) -> Option<u32> {
        self.movie_timescale
    }

    pub fn cached_media_timescale(&self, track_id: u32) -> Option<u32> {
        self.cached_media_timescales.get(&track_id).copied()
    }
}

impl Coordinator for EditListCoordinator {
    type Env<'a> = EditListEnv;

    fn will_start_box(&mut self, header: &BoxHeader, _depth: usize) {
        if header.is(b"trak") {
            self.tracks.push(TrackContext::default());
        }
    }

    fn did_parse_payload(&mut self, _header: &BoxHeader, payload: &ParsedPayload) {
        match &payload.detail {
            Some(Detail::MovieHeader(mvhd)) => self.movie_timescale = Some(mvhd.timescale),
            Some(Detail::TrackHeader(tkhd)) => {
                if let Some(track) = self.tracks.last_mut() {
                    track.track_id = Some(tkhd.track_id);
                }
            }
            Some(Detail::MediaHeader(mdhd)) => {
                if let Some(track) = self.tracks.last_mut() {
                    track.media_timescale = Some(mdhd.timescale);
                    if let Some(id) = track.track_id {
                        self.cached_media_timescales.insert(id, mdhd.timescale);
                    }
                }
            }
            _ => {}
        }
    }

    fn did_finish_box(&mut self, header: &BoxHeader) -> Option<ParsedPayload> {
        if header.is(b"trak") {
            if let Some(TrackContext {
                track_id: Some(id),
                media_timescale: Some(ts),
            }) = self.tracks.pop()
            {
                self.cached_media_timescales.insert(id, ts);
            }
        }
        None
    }

    fn environment<'a>(&'a self, header: &BoxHeader) -> Option<EditListEnv> {
        if !header.is(b"elst") {
            return None;
        }
        let track = self.tracks.last();
        let media_timescale = track.and_then(|t| {
            t.media_timescale
                .or_else(|| t.track_id.and_then(|id| self.cached_media_timescale(id)))
        });
        Some(EditListEnv {
            movie_timescale: self.movie_timescale,
            media_timescale,
        })
    }
}
