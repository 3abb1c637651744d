//! Matroska / WebM container writer and inspector.
//!
//! The muxer collects every chunk in memory and assembles the container in
//! one pass at finalize, so all element sizes are known up front and no
//! seeking is needed.
//!
//! Layout: EBML header, then one Segment holding Info, Tracks, Clusters of
//! SimpleBlocks ordered by timestamp, and Cues for video keyframes.
//! Timestamps use a 1 ms timestamp scale.

use serde::Serialize;

use mosaic_common::{MosaicError, MosaicResult};
use mosaic_media_model::{ChunkKind, ContainerFormat, EncodedChunk, VideoCodec};

mod id {
    pub const EBML: u32 = 0x1A45_DFA3;
    pub const EBML_VERSION: u32 = 0x4286;
    pub const EBML_READ_VERSION: u32 = 0x42F7;
    pub const EBML_MAX_ID_LENGTH: u32 = 0x42F2;
    pub const EBML_MAX_SIZE_LENGTH: u32 = 0x42F3;
    pub const DOC_TYPE: u32 = 0x4282;
    pub const DOC_TYPE_VERSION: u32 = 0x4287;
    pub const DOC_TYPE_READ_VERSION: u32 = 0x4285;

    pub const SEGMENT: u32 = 0x1853_8067;

    pub const INFO: u32 = 0x1549_A966;
    pub const TIMESTAMP_SCALE: u32 = 0x2A_D7B1;
    pub const DURATION: u32 = 0x4489;
    pub const MUXING_APP: u32 = 0x4D80;
    pub const WRITING_APP: u32 = 0x5741;

    pub const TRACKS: u32 = 0x1654_AE6B;
    pub const TRACK_ENTRY: u32 = 0xAE;
    pub const TRACK_NUMBER: u32 = 0xD7;
    pub const TRACK_UID: u32 = 0x73C5;
    pub const TRACK_TYPE: u32 = 0x83;
    pub const FLAG_LACING: u32 = 0x9C;
    pub const CODEC_ID: u32 = 0x86;
    pub const CODEC_PRIVATE: u32 = 0x63A2;
    pub const DEFAULT_DURATION: u32 = 0x23_E383;
    pub const VIDEO: u32 = 0xE0;
    pub const PIXEL_WIDTH: u32 = 0xB0;
    pub const PIXEL_HEIGHT: u32 = 0xBA;
    pub const AUDIO: u32 = 0xE1;
    pub const SAMPLING_FREQUENCY: u32 = 0xB5;
    pub const CHANNELS: u32 = 0x9F;

    pub const CLUSTER: u32 = 0x1F43_B675;
    pub const TIMESTAMP: u32 = 0xE7;
    pub const SIMPLE_BLOCK: u32 = 0xA3;

    pub const CUES: u32 = 0x1C53_BB6B;
    pub const CUE_POINT: u32 = 0xBB;
    pub const CUE_TIME: u32 = 0xB3;
    pub const CUE_TRACK_POSITIONS: u32 = 0xB7;
    pub const CUE_TRACK: u32 = 0xF7;
    pub const CUE_CLUSTER_POSITION: u32 = 0xF1;
}

const TRACK_TYPE_VIDEO: u64 = 1;
const TRACK_TYPE_AUDIO: u64 = 2;
const VIDEO_TRACK: u64 = 1;
const AUDIO_TRACK: u64 = 2;
const UNKNOWN_SIZE: u64 = u64::MAX;

/// Track parameters needed to write the Tracks element.
#[derive(Debug, Clone)]
pub struct TrackHeader {
    pub kind: ChunkKind,
    pub codec_id: &'static str,
    pub codec_private: Option<Vec<u8>>,
    pub default_duration_ns: Option<u64>,
    pub width: u32,
    pub height: u32,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Everything the writer needs for one file.
#[derive(Debug, Clone)]
pub struct ContainerLayout {
    pub format: ContainerFormat,
    pub video_codec: VideoCodec,
    pub video: TrackHeader,
    pub audio: Option<TrackHeader>,
    pub writing_app: String,
}

/// Minimal EBML element writer.
#[derive(Default)]
struct Ebml {
    buf: Vec<u8>,
}

impl Ebml {
    fn len(&self) -> usize {
        self.buf.len()
    }

    fn id(&mut self, id: u32) {
        let bytes = id.to_be_bytes();
        let skip = bytes.iter().take_while(|&&b| b == 0).count().min(3);
        self.buf.extend_from_slice(&bytes[skip..]);
    }

    fn size(&mut self, size: u64) {
        let mut len = 1;
        while len < 8 && size >= (1u64 << (7 * len)) - 1 {
            len += 1;
        }
        let marked = size | (1u64 << (7 * len));
        self.buf.extend_from_slice(&marked.to_be_bytes()[8 - len..]);
    }

    fn binary(&mut self, id: u32, data: &[u8]) {
        self.id(id);
        self.size(data.len() as u64);
        self.buf.extend_from_slice(data);
    }

    fn uint(&mut self, id: u32, value: u64) {
        let bytes = value.to_be_bytes();
        let skip = bytes.iter().take_while(|&&b| b == 0).count().min(7);
        self.binary(id, &bytes[skip..]);
    }

    fn float(&mut self, id: u32, value: f64) {
        self.binary(id, &value.to_be_bytes());
    }

    fn string(&mut self, id: u32, value: &str) {
        self.binary(id, value.as_bytes());
    }

    fn master(&mut self, id: u32, body: impl FnOnce(&mut Ebml)) {
        let mut inner = Ebml::default();
        body(&mut inner);
        self.binary(id, &inner.buf);
    }

    fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Assemble a complete container from `chunks`.
///
/// Chunks are interleaved by timestamp. A new cluster starts on every video
/// keyframe and whenever a block's offset from the cluster timestamp would
/// not fit the signed 16-bit SimpleBlock field.
pub fn write_container(layout: &ContainerLayout, chunks: &[EncodedChunk]) -> MosaicResult<Vec<u8>> {
    if !layout.format.accepts_video(layout.video_codec) {
        return Err(MosaicError::mux(format!(
            "{} cannot carry {}",
            layout.format.doc_type(),
            layout.video.codec_id
        )));
    }

    let mut ordered: Vec<&EncodedChunk> = chunks
        .iter()
        .filter(|c| c.kind == ChunkKind::Video || layout.audio.is_some())
        .collect();
    ordered.sort_by_key(|c| (c.timestamp, c.kind == ChunkKind::Audio));

    let duration_ms = ordered
        .iter()
        .map(|c| c.end().as_secs_f64() * 1000.0)
        .fold(0.0, f64::max);

    let mut segment = Ebml::default();
    segment.master(id::INFO, |info| {
        info.uint(id::TIMESTAMP_SCALE, 1_000_000);
        info.float(id::DURATION, duration_ms);
        info.string(id::MUXING_APP, &layout.writing_app);
        info.string(id::WRITING_APP, &layout.writing_app);
    });
    segment.master(id::TRACKS, |tracks| {
        write_track(tracks, VIDEO_TRACK, &layout.video);
        if let Some(audio) = &layout.audio {
            write_track(tracks, AUDIO_TRACK, audio);
        }
    });

    let mut cues: Vec<(u64, u64)> = Vec::new();
    let mut cluster: Option<(u64, Ebml)> = None;
    let mut cluster_start = 0u64;

    for chunk in ordered {
        let ts = chunk.timestamp.as_millis() as u64;
        let is_video_key = chunk.kind == ChunkKind::Video && chunk.is_keyframe;
        let needs_new = match &cluster {
            None => true,
            Some((base, _)) => is_video_key || ts.saturating_sub(*base) > i16::MAX as u64,
        };

        if needs_new {
            if let Some((_, body)) = cluster.take() {
                segment.binary(id::CLUSTER, &body.into_inner());
            }
            cluster_start = segment.len() as u64;
            let mut body = Ebml::default();
            body.uint(id::TIMESTAMP, ts);
            cluster = Some((ts, body));
        }

        if is_video_key {
            cues.push((ts, cluster_start));
        }

        if let Some((base, body)) = cluster.as_mut() {
            let track = match chunk.kind {
                ChunkKind::Video => VIDEO_TRACK,
                ChunkKind::Audio => AUDIO_TRACK,
            };
            let relative = (ts - *base) as i16;
            let mut block = Vec::with_capacity(chunk.payload.len() + 4);
            block.push(0x80 | track as u8);
            block.extend_from_slice(&relative.to_be_bytes());
            block.push(if chunk.is_keyframe { 0x80 } else { 0x00 });
            block.extend_from_slice(&chunk.payload);
            body.binary(id::SIMPLE_BLOCK, &block);
        }
    }
    if let Some((_, body)) = cluster.take() {
        segment.binary(id::CLUSTER, &body.into_inner());
    }

    if !cues.is_empty() {
        segment.master(id::CUES, |c| {
            for (time, position) in &cues {
                c.master(id::CUE_POINT, |point| {
                    point.uint(id::CUE_TIME, *time);
                    point.master(id::CUE_TRACK_POSITIONS, |pos| {
                        pos.uint(id::CUE_TRACK, VIDEO_TRACK);
                        pos.uint(id::CUE_CLUSTER_POSITION, *position);
                    });
                });
            }
        });
    }

    let mut file = Ebml::default();
    file.master(id::EBML, |h| {
        h.uint(id::EBML_VERSION, 1);
        h.uint(id::EBML_READ_VERSION, 1);
        h.uint(id::EBML_MAX_ID_LENGTH, 4);
        h.uint(id::EBML_MAX_SIZE_LENGTH, 8);
        h.string(id::DOC_TYPE, layout.format.doc_type());
        h.uint(id::DOC_TYPE_VERSION, 4);
        h.uint(id::DOC_TYPE_READ_VERSION, 2);
    });
    file.binary(id::SEGMENT, &segment.into_inner());
    Ok(file.into_inner())
}

fn write_track(tracks: &mut Ebml, number: u64, header: &TrackHeader) {
    tracks.master(id::TRACK_ENTRY, |t| {
        t.uint(id::TRACK_NUMBER, number);
        t.uint(id::TRACK_UID, number);
        let track_type = match header.kind {
            ChunkKind::Video => TRACK_TYPE_VIDEO,
            ChunkKind::Audio => TRACK_TYPE_AUDIO,
        };
        t.uint(id::TRACK_TYPE, track_type);
        t.uint(id::FLAG_LACING, 0);
        t.string(id::CODEC_ID, header.codec_id);
        if let Some(private) = &header.codec_private {
            t.binary(id::CODEC_PRIVATE, private);
        }
        if let Some(ns) = header.default_duration_ns {
            t.uint(id::DEFAULT_DURATION, ns);
        }
        match header.kind {
            ChunkKind::Video => t.master(id::VIDEO, |v| {
                v.uint(id::PIXEL_WIDTH, u64::from(header.width));
                v.uint(id::PIXEL_HEIGHT, u64::from(header.height));
            }),
            ChunkKind::Audio => t.master(id::AUDIO, |a| {
                a.float(id::SAMPLING_FREQUENCY, f64::from(header.sample_rate));
                a.uint(id::CHANNELS, u64::from(header.channels));
            }),
        }
    });
}

/// Per-track statistics read back from a container.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackSummary {
    pub number: u64,
    pub kind: Option<ChunkKind>,
    pub codec_id: String,
    pub codec_private_len: usize,
    pub width: Option<u64>,
    pub height: Option<u64>,
    pub sample_rate: Option<f64>,
    pub channels: Option<u64>,
    pub blocks: u64,
    pub keyframes: u64,
    pub first_ms: Option<u64>,
    pub last_ms: Option<u64>,
}

/// What [`inspect`] found in a container.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContainerSummary {
    pub doc_type: String,
    pub timestamp_scale: u64,
    pub duration_ms: Option<f64>,
    pub tracks: Vec<TrackSummary>,
    pub clusters: u64,
    pub cue_points: u64,
}

impl ContainerSummary {
    pub fn track(&self, kind: ChunkKind) -> Option<&TrackSummary> {
        self.tracks.iter().find(|t| t.kind == Some(kind))
    }

    pub fn blocks(&self, kind: ChunkKind) -> u64 {
        self.track(kind).map_or(0, |t| t.blocks)
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn vint(&mut self, keep_marker: bool) -> MosaicResult<u64> {
        let first = *self.data.get(self.pos).ok_or_else(|| malformed("truncated variable-length integer"))?;
        let len = first.leading_zeros() as usize + 1;
        if len > 8 {
            return Err(malformed("invalid variable-length integer"));
        }
        let bytes = self
            .data
            .get(self.pos..self.pos + len)
            .ok_or_else(|| malformed("truncated variable-length integer"))?;
        self.pos += len;

        let mut value = if keep_marker {
            u64::from(first)
        } else {
            u64::from(first) & ((1u64 << (8 - len)) - 1)
        };
        for &b in &bytes[1..] {
            value = (value << 8) | u64::from(b);
        }
        let all_ones = (1u64 << (7 * len)) - 1;
        if !keep_marker && value == all_ones {
            return Ok(UNKNOWN_SIZE);
        }
        Ok(value)
    }

    /// Next element header and its body.
    fn element(&mut self) -> MosaicResult<(u32, &'a [u8])> {
        let id = self.vint(true)? as u32;
        let size = self.vint(false)?;
        let end = if size == UNKNOWN_SIZE {
            self.data.len()
        } else {
            self.pos
                .checked_add(size as usize)
                .filter(|&end| end <= self.data.len())
                .ok_or_else(|| malformed(format!("element {id:#x} overruns its parent")))?
        };
        let body = &self.data[self.pos..end];
        self.pos = end;
        Ok((id, body))
    }
}

fn malformed(message: impl Into<String>) -> MosaicError {
    MosaicError::mux(format!("malformed container: {}", message.into()))
}

fn read_uint(body: &[u8]) -> u64 {
    body.iter().take(8).fold(0, |acc, &b| (acc << 8) | u64::from(b))
}

fn read_float(body: &[u8]) -> Option<f64> {
    match body.len() {
        4 => Some(f64::from(f32::from_be_bytes(body.try_into().ok()?))),
        8 => Some(f64::from_be_bytes(body.try_into().ok()?)),
        _ => None,
    }
}

/// Read back a container's structure.
pub fn inspect(bytes: &[u8]) -> MosaicResult<ContainerSummary> {
    let mut summary = ContainerSummary {
        timestamp_scale: 1_000_000,
        ..Default::default()
    };
    let mut top = Reader::new(bytes);

    let (header_id, header) = top.element()?;
    if header_id != id::EBML {
        return Err(malformed("missing EBML header"));
    }
    let mut r = Reader::new(header);
    while !r.at_end() {
        let (child, body) = r.element()?;
        if child == id::DOC_TYPE {
            summary.doc_type = String::from_utf8_lossy(body).into_owned();
        }
    }

    while !top.at_end() {
        let (element, body) = top.element()?;
        if element == id::SEGMENT {
            read_segment(body, &mut summary)?;
        }
    }
    Ok(summary)
}

fn read_segment(segment: &[u8], summary: &mut ContainerSummary) -> MosaicResult<()> {
    let mut r = Reader::new(segment);
    while !r.at_end() {
        let (element, body) = r.element()?;
        match element {
            id::INFO => {
                let mut info = Reader::new(body);
                while !info.at_end() {
                    let (child, value) = info.element()?;
                    match child {
                        id::TIMESTAMP_SCALE => summary.timestamp_scale = read_uint(value),
                        id::DURATION => summary.duration_ms = read_float(value),
                        _ => {}
                    }
                }
            }
            id::TRACKS => {
                let mut tracks = Reader::new(body);
                while !tracks.at_end() {
                    let (child, entry) = tracks.element()?;
                    if child == id::TRACK_ENTRY {
                        summary.tracks.push(read_track(entry)?);
                    }
                }
            }
            id::CLUSTER => {
                summary.clusters += 1;
                read_cluster(body, summary)?;
            }
            id::CUES => {
                let mut cues = Reader::new(body);
                while !cues.at_end() {
                    if cues.element()?.0 == id::CUE_POINT {
                        summary.cue_points += 1;
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn read_track(entry: &[u8]) -> MosaicResult<TrackSummary> {
    let mut track = TrackSummary::default();
    let mut r = Reader::new(entry);
    while !r.at_end() {
        let (child, body) = r.element()?;
        match child {
            id::TRACK_NUMBER => track.number = read_uint(body),
            id::TRACK_TYPE => {
                track.kind = match read_uint(body) {
                    TRACK_TYPE_VIDEO => Some(ChunkKind::Video),
                    TRACK_TYPE_AUDIO => Some(ChunkKind::Audio),
                    _ => None,
                }
            }
            id::CODEC_ID => track.codec_id = String::from_utf8_lossy(body).into_owned(),
            id::CODEC_PRIVATE => track.codec_private_len = body.len(),
            id::VIDEO => {
                let mut v = Reader::new(body);
                while !v.at_end() {
                    let (field, value) = v.element()?;
                    match field {
                        id::PIXEL_WIDTH => track.width = Some(read_uint(value)),
                        id::PIXEL_HEIGHT => track.height = Some(read_uint(value)),
                        _ => {}
                    }
                }
            }
            id::AUDIO => {
                let mut a = Reader::new(body);
                while !a.at_end() {
                    let (field, value) = a.element()?;
                    match field {
                        id::SAMPLING_FREQUENCY => track.sample_rate = read_float(value),
                        id::CHANNELS => track.channels = Some(read_uint(value)),
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
    Ok(track)
}

fn read_cluster(cluster: &[u8], summary: &mut ContainerSummary) -> MosaicResult<()> {
    let mut base = 0u64;
    let mut r = Reader::new(cluster);
    while !r.at_end() {
        let (child, body) = r.element()?;
        match child {
            id::TIMESTAMP => base = read_uint(body),
            id::SIMPLE_BLOCK => {
                let mut block = Reader::new(body);
                let number = block.vint(false)?;
                let header = body
                    .get(block.pos..block.pos + 3)
                    .ok_or_else(|| malformed("truncated block header"))?;
                let relative = i16::from_be_bytes([header[0], header[1]]);
                let keyframe = header[2] & 0x80 != 0;
                let ts = base.saturating_add_signed(i64::from(relative));

                if let Some(track) = summary.tracks.iter_mut().find(|t| t.number == number) {
                    track.blocks += 1;
                    if keyframe {
                        track.keyframes += 1;
                    }
                    track.first_ms.get_or_insert(ts);
                    track.last_ms = Some(ts);
                }
            }
            _ => {}
        }
    }
    Ok(())
}
