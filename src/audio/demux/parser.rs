//! Resumable EBML/WebM parser.
//!
//! The parser pulls from a [`Reader`] until it blocks, keeping everything it
//! needs to resume in `self`: partially read element headers, the stack of
//! open master elements and the track entry under construction. Leaf elements
//! are only consumed once they are buffered whole, so a `WouldBlock` never
//! loses bytes.

use crate::{
    audio::constants::{MAX_BLOCK_SIZE, MAX_VALUE_SIZE},
    audio::demux::{
        callback::{Action, AudioSettings, BlockHeader, Callback, ClusterInfo, FrameMeta, TrackEntry},
        ebml::{self, *},
    },
    audio::reader::{ReadStatus, Reader},
    common::errors::DemuxError,
};

/// Result of a successful [`WebmParser::feed`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    /// The whole stream has been parsed.
    Completed,
    /// More bytes are needed; call `feed` again after the next push.
    WouldBlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ElementHeader {
    id: u32,
    /// `None` for the unknown-size sentinel.
    size: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
struct OpenMaster {
    id: u32,
    /// Absolute reader position where the element ends, when known.
    end: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum State {
    #[default]
    Header,
    Skip { id: u32, remaining: u64 },
    Leaf { id: u32, size: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Master,
    Value,
    Block,
    Skip,
}

/// Bytes of an element header read so far.
#[derive(Debug, Default)]
struct HeaderBuf {
    bytes: [u8; MAX_ID_LEN + MAX_SIZE_LEN],
    len: usize,
}

impl HeaderBuf {
    fn id_len(&self) -> usize {
        if self.len == 0 {
            return 0;
        }
        vint_len(self.bytes[0]).unwrap_or(0)
    }

    /// Total header length known to be required given the bytes seen so far.
    fn target(&self) -> usize {
        let id_len = self.id_len();
        if self.len == 0 {
            1
        } else if self.len < id_len {
            id_len
        } else if self.len == id_len {
            id_len + 1
        } else {
            id_len + vint_len(self.bytes[id_len]).unwrap_or(0)
        }
    }

    fn push(&mut self, byte: u8) -> Result<(), DemuxError> {
        if self.len == 0 {
            match vint_len(byte) {
                Some(n) if n <= MAX_ID_LEN => {}
                _ => return Err(DemuxError::Malformed("invalid element id")),
            }
        } else if self.len == self.id_len() && vint_len(byte).is_none() {
            return Err(DemuxError::Malformed("invalid element size"));
        }
        self.bytes[self.len] = byte;
        self.len += 1;
        Ok(())
    }

    fn take(&mut self) -> Option<ElementHeader> {
        let id_len = self.id_len();
        if self.len <= id_len || self.len != self.target() {
            return None;
        }
        let header = ElementHeader {
            id: decode_id(&self.bytes[..id_len]),
            size: decode_size(&self.bytes[id_len..self.len]),
        };
        self.len = 0;
        Some(header)
    }

    fn partial_id(&self) -> u32 {
        decode_id(&self.bytes[..self.len.min(self.id_len().max(1))])
    }
}

enum HeaderStep {
    Ready(ElementHeader),
    Blocked,
    EndOfStream,
}

#[derive(Debug, Default)]
struct TrackBuilder {
    number: u64,
    track_type: u64,
    codec_id: String,
    audio: Option<AudioSettings>,
}

impl TrackBuilder {
    fn build(self) -> TrackEntry {
        TrackEntry {
            number: self.number,
            track_type: self.track_type,
            codec_id: self.codec_id,
            audio: self.audio,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ClusterProgress {
    position: u64,
    timecode: u64,
    announced: bool,
}

/// Incremental WebM parser. One instance per byte stream.
///
/// After `feed` returns an error the parser must be reset with
/// [`did_seek`](Self::did_seek) before it is used again.
#[derive(Debug, Default)]
pub struct WebmParser {
    state: State,
    header: HeaderBuf,
    stack: Vec<OpenMaster>,
    track: Option<TrackBuilder>,
    cluster: Option<ClusterProgress>,
}

impl WebmParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget all progress. The next `feed` expects a stream that starts at
    /// position zero of a fresh reader.
    pub fn did_seek(&mut self) {
        *self = Self::default();
    }

    /// Number of master elements currently open.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Parse as far as `reader` allows, raising events on `callback`.
    pub fn feed<C, R>(&mut self, callback: &mut C, reader: &mut R) -> Result<FeedStatus, DemuxError>
    where
        C: Callback + ?Sized,
        R: Reader + ?Sized,
    {
        loop {
            self.close_finished(reader.position(), callback)?;

            match self.state {
                State::Header => {
                    let header = match self.read_header(reader)? {
                        HeaderStep::Ready(header) => header,
                        HeaderStep::Blocked => return Ok(FeedStatus::WouldBlock),
                        HeaderStep::EndOfStream => return self.finish(callback),
                    };
                    self.close_unknown_for(header.id, callback)?;
                    self.begin_element(header, reader.position())?;
                }
                State::Skip { remaining: 0, .. } => self.state = State::Header,
                State::Skip { id, remaining } => {
                    let available = reader.available();
                    if available == 0 {
                        if reader.is_complete() {
                            return Err(DemuxError::Truncated { id });
                        }
                        return Ok(FeedStatus::WouldBlock);
                    }
                    let (skipped, _) = reader.skip(remaining.min(available));
                    self.state = State::Skip {
                        id,
                        remaining: remaining - skipped,
                    };
                }
                State::Leaf { id, size } => {
                    if reader.available() < size {
                        if reader.is_complete() {
                            return Err(DemuxError::Truncated { id });
                        }
                        return Ok(FeedStatus::WouldBlock);
                    }
                    let mut data = vec![0u8; size as usize];
                    let (read, status) = reader.read(&mut data);
                    if status != ReadStatus::CompletedOk || read != data.len() {
                        return Err(DemuxError::Truncated { id });
                    }
                    self.state = State::Header;
                    self.handle_leaf(id, &data, callback)?;
                }
            }
        }
    }

    fn read_header<R: Reader + ?Sized>(&mut self, reader: &mut R) -> Result<HeaderStep, DemuxError> {
        loop {
            if let Some(header) = self.header.take() {
                return Ok(HeaderStep::Ready(header));
            }
            let mut byte = [0u8; 1];
            match reader.read(&mut byte) {
                (1, _) => self.header.push(byte[0])?,
                (_, ReadStatus::WouldBlock) => return Ok(HeaderStep::Blocked),
                _ if self.header.len == 0 => return Ok(HeaderStep::EndOfStream),
                _ => {
                    return Err(DemuxError::Truncated {
                        id: self.header.partial_id(),
                    });
                }
            }
        }
    }

    /// End of stream on an element boundary. Only unknown-sized masters may
    /// still be open.
    fn finish<C: Callback + ?Sized>(&mut self, callback: &mut C) -> Result<FeedStatus, DemuxError> {
        if let Some(open) = self.stack.iter().rev().find(|m| m.end.is_some()) {
            return Err(DemuxError::Truncated { id: open.id });
        }
        while !self.stack.is_empty() {
            self.close_top(callback)?;
        }
        Ok(FeedStatus::Completed)
    }

    fn close_finished<C: Callback + ?Sized>(&mut self, pos: u64, callback: &mut C) -> Result<(), DemuxError> {
        while let Some(OpenMaster { end: Some(end), .. }) = self.stack.last() {
            if pos < *end {
                break;
            }
            self.close_top(callback)?;
        }
        Ok(())
    }

    /// An unknown-sized master ends where an element that cannot be its
    /// child begins.
    fn close_unknown_for<C: Callback + ?Sized>(&mut self, id: u32, callback: &mut C) -> Result<(), DemuxError> {
        let Some(child_level) = ebml::level(id) else {
            return Ok(());
        };
        while let Some(top) = self.stack.last() {
            if top.end.is_some() {
                break;
            }
            match ebml::level(top.id) {
                Some(top_level) if child_level <= top_level => self.close_top(callback)?,
                _ => break,
            }
        }
        Ok(())
    }

    fn close_top<C: Callback + ?Sized>(&mut self, callback: &mut C) -> Result<(), DemuxError> {
        let Some(master) = self.stack.pop() else {
            return Ok(());
        };
        match master.id {
            TRACK_ENTRY => {
                if let Some(track) = self.track.take() {
                    callback.on_track_entry(&track.build())?;
                }
            }
            CLUSTER => self.cluster = None,
            _ => {}
        }
        Ok(())
    }

    fn classify(&self, id: u32) -> Kind {
        let parent = self.stack.last().map(|m| m.id);
        match (parent, id) {
            (None, EBML | SEGMENT | CLUSTER) => Kind::Master,
            (Some(EBML), DOC_TYPE) => Kind::Value,
            (Some(SEGMENT), TRACKS | CLUSTER) => Kind::Master,
            (Some(TRACKS), TRACK_ENTRY) => Kind::Master,
            (Some(TRACK_ENTRY), AUDIO) => Kind::Master,
            (Some(TRACK_ENTRY), TRACK_NUMBER | TRACK_TYPE | CODEC_ID) => Kind::Value,
            (Some(AUDIO), SAMPLING_FREQUENCY | CHANNELS) => Kind::Value,
            (Some(CLUSTER), TIMECODE) => Kind::Value,
            (Some(CLUSTER), SIMPLE_BLOCK) => Kind::Block,
            (Some(CLUSTER), BLOCK_GROUP) => Kind::Master,
            (Some(BLOCK_GROUP), BLOCK) => Kind::Block,
            _ => Kind::Skip,
        }
    }

    fn begin_element(&mut self, header: ElementHeader, pos: u64) -> Result<(), DemuxError> {
        let ElementHeader { id, size } = header;

        if let (Some(size), Some(parent_end)) = (size, self.stack.last().and_then(|m| m.end)) {
            if pos + size > parent_end {
                return Err(DemuxError::Malformed("element overruns its parent"));
            }
        }

        match self.classify(id) {
            Kind::Master => {
                self.stack.push(OpenMaster {
                    id,
                    end: size.map(|s| pos + s),
                });
                match id {
                    TRACK_ENTRY => self.track = Some(TrackBuilder::default()),
                    AUDIO => {
                        if let Some(track) = self.track.as_mut() {
                            track.audio.get_or_insert_with(AudioSettings::default);
                        }
                    }
                    CLUSTER => {
                        self.cluster = Some(ClusterProgress {
                            position: pos,
                            timecode: 0,
                            announced: false,
                        })
                    }
                    _ => {}
                }
            }
            kind @ (Kind::Value | Kind::Block) => {
                let size = size.ok_or(DemuxError::Malformed("unknown size on a leaf element"))?;
                let limit = if kind == Kind::Block {
                    MAX_BLOCK_SIZE
                } else {
                    MAX_VALUE_SIZE
                };
                if size > limit {
                    return Err(DemuxError::ElementTooLarge { id, size });
                }
                self.state = State::Leaf { id, size };
            }
            Kind::Skip => {
                let size = size.ok_or(DemuxError::Malformed("unknown size on a skipped element"))?;
                self.state = State::Skip { id, remaining: size };
            }
        }
        Ok(())
    }

    fn handle_leaf<C: Callback + ?Sized>(&mut self, id: u32, data: &[u8], callback: &mut C) -> Result<(), DemuxError> {
        match id {
            DOC_TYPE => {
                let doc_type = read_string(data);
                if doc_type != "webm" && doc_type != "matroska" {
                    return Err(DemuxError::Malformed("unsupported doc type"));
                }
            }
            TRACK_NUMBER | TRACK_TYPE | CODEC_ID | SAMPLING_FREQUENCY | CHANNELS => {
                let Some(track) = self.track.as_mut() else {
                    return Ok(());
                };
                match id {
                    TRACK_NUMBER => track.number = read_uint(data)?,
                    TRACK_TYPE => track.track_type = read_uint(data)?,
                    CODEC_ID => track.codec_id = read_string(data),
                    SAMPLING_FREQUENCY => {
                        track.audio.get_or_insert_with(AudioSettings::default).sampling_frequency = read_float(data)?
                    }
                    _ => track.audio.get_or_insert_with(AudioSettings::default).channels = read_uint(data)?,
                }
            }
            TIMECODE => {
                let timecode = read_uint(data)?;
                self.announce_cluster(Some(timecode), callback)?;
            }
            SIMPLE_BLOCK | BLOCK => self.handle_block(id, data, callback)?,
            _ => {}
        }
        Ok(())
    }

    /// Raises `on_cluster_begin` once per cluster, at its `Timecode` or at its
    /// first block, whichever comes first.
    fn announce_cluster<C: Callback + ?Sized>(
        &mut self,
        timecode: Option<u64>,
        callback: &mut C,
    ) -> Result<(), DemuxError> {
        let Some(cluster) = self.cluster.as_mut() else {
            return Ok(());
        };
        if cluster.announced {
            return Ok(());
        }
        cluster.announced = true;
        cluster.timecode = timecode.unwrap_or(0);
        callback.on_cluster_begin(&ClusterInfo {
            timecode: cluster.timecode,
            position: cluster.position,
        })
    }

    fn handle_block<C: Callback + ?Sized>(&mut self, id: u32, data: &[u8], callback: &mut C) -> Result<(), DemuxError> {
        let (track_number, n) = read_vint(data)?;
        if data.len() < n + 3 {
            return Err(DemuxError::Malformed("block header truncated"));
        }
        let relative_timecode = i16::from_be_bytes([data[n], data[n + 1]]);
        let flags = data[n + 2];
        let frames = split_laced(flags, &data[n + 3..])?;

        self.announce_cluster(None, callback)?;

        // Blocks inside a BlockGroup carry no keyframe flag.
        let keyframe = id == BLOCK || flags & 0x80 != 0;
        let header = BlockHeader {
            track_number,
            relative_timecode,
            keyframe,
            frame_count: frames.len(),
        };
        if callback.on_block_begin(&header) == Action::Skip {
            return Ok(());
        }

        let cluster_timecode = self.cluster.map_or(0, |c| c.timecode);
        let meta = FrameMeta {
            track_number,
            timecode: cluster_timecode as i64 + relative_timecode as i64,
            keyframe,
        };
        for frame in frames {
            callback.on_frame(&meta, frame)?;
        }
        Ok(())
    }
}

/// Split a block body into frames according to the lacing bits in `flags`.
fn split_laced(flags: u8, body: &[u8]) -> Result<Vec<&[u8]>, DemuxError> {
    let lacing = (flags >> 1) & 0x03;
    if lacing == 0 {
        return Ok(vec![body]);
    }

    let (&count_byte, rest) = body
        .split_first()
        .ok_or(DemuxError::Malformed("missing lace count"))?;
    let count = count_byte as usize + 1;
    let mut sizes = Vec::with_capacity(count);
    let mut cursor = 0usize;

    match lacing {
        // Xiph
        1 => {
            for _ in 0..count - 1 {
                let mut size = 0usize;
                loop {
                    let b = *rest
                        .get(cursor)
                        .ok_or(DemuxError::Malformed("xiph lace sizes truncated"))?;
                    cursor += 1;
                    size += b as usize;
                    if b != 0xFF {
                        break;
                    }
                }
                sizes.push(size);
            }
        }
        // EBML
        3 => {
            if count > 1 {
                let (first, n) = read_vint(&rest[cursor..])?;
                cursor += n;
                sizes.push(first as usize);
                let mut prev = first as i64;
                for _ in 1..count - 1 {
                    let (delta, n) = read_signed_vint(&rest[cursor..])?;
                    cursor += n;
                    prev += delta;
                    if prev < 0 {
                        return Err(DemuxError::Malformed("negative lace size"));
                    }
                    sizes.push(prev as usize);
                }
            }
        }
        // Fixed-size
        _ => {
            if rest.len() % count != 0 {
                return Err(DemuxError::Malformed("fixed lace size mismatch"));
            }
            sizes.resize(count - 1, rest.len() / count);
        }
    }

    let payload = &rest[cursor..];
    let used: usize = sizes.iter().sum();
    if used > payload.len() {
        return Err(DemuxError::Malformed("lace sizes overrun block"));
    }
    sizes.push(payload.len() - used);

    let mut frames = Vec::with_capacity(count);
    let mut offset = 0;
    for size in sizes {
        frames.push(&payload[offset..offset + size]);
        offset += size;
    }
    Ok(frames)
}
