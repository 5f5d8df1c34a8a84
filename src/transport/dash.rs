//! DASH MPD parsing and audio representation selection.
//!
//! Only what the segmented transport needs is modelled: base URLs,
//! representations with their mime type and bandwidth, and the segment
//! addressing schemes (`SegmentList`, `SegmentTemplate` with or without a
//! `SegmentTimeline`, or a bare `BaseURL` for single-file representations).

use quick_xml::{
    Reader,
    escape::unescape,
    events::{BytesStart, Event},
};
use reqwest::Url;

use crate::{audio::constants::MAX_TIMELINE_SEGMENTS, common::errors::TransportError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segments {
    List {
        initialization: Option<String>,
        media: Vec<String>,
    },
    Template {
        initialization: Option<String>,
        media: String,
        start_number: u64,
        /// Start times from the `SegmentTimeline`, one per segment.
        times: Vec<u64>,
        /// `None` for open-ended (live) templates.
        count: Option<u64>,
    },
    /// The representation's `BaseURL` is the whole stream.
    Single,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Representation {
    pub id: String,
    pub bandwidth: u64,
    pub mime_type: String,
    pub codecs: String,
    pub base_url: Url,
    pub segments: Segments,
}

impl Representation {
    /// Number of segments including initialisation, when bounded.
    pub fn segment_count(&self) -> Option<usize> {
        match &self.segments {
            Segments::List {
                initialization,
                media,
            } => Some(media.len() + initialization.is_some() as usize),
            Segments::Template {
                initialization,
                count,
                ..
            } => count.map(|c| c as usize + initialization.is_some() as usize),
            Segments::Single => Some(1),
        }
    }

    /// Absolute URL of segment `index`. Index 0 is the initialisation segment
    /// when the manifest names one.
    pub fn segment_url(&self, index: usize) -> Option<Url> {
        let relative = match &self.segments {
            Segments::List {
                initialization,
                media,
            } => match (initialization, index) {
                (Some(init), 0) => init.clone(),
                (Some(_), i) => media.get(i - 1)?.clone(),
                (None, i) => media.get(i)?.clone(),
            },
            Segments::Template {
                initialization,
                media,
                start_number,
                times,
                count,
            } => {
                let media_index = match initialization {
                    Some(init) if index == 0 => {
                        return self.resolve(&self.expand(init, *start_number, 0));
                    }
                    Some(_) => index - 1,
                    None => index,
                };
                if count.is_some_and(|c| media_index as u64 >= c) {
                    return None;
                }
                let time = times.get(media_index).copied().unwrap_or(0);
                self.expand(media, start_number + media_index as u64, time)
            }
            Segments::Single => {
                return (index == 0).then(|| self.base_url.clone());
            }
        };
        self.resolve(&relative)
    }

    fn resolve(&self, relative: &str) -> Option<Url> {
        self.base_url.join(relative).ok()
    }

    fn expand(&self, template: &str, number: u64, time: u64) -> String {
        template
            .replace("$RepresentationID$", &self.id)
            .replace("$Bandwidth$", &self.bandwidth.to_string())
            .replace("$Number$", &number.to_string())
            .replace("$Time$", &time.to_string())
            .replace("$$", "$")
    }

    pub fn is_audio_webm(&self) -> bool {
        self.mime_type.contains("audio/webm")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub representations: Vec<Representation>,
}

impl Manifest {
    /// The manifest filter: video is ignored, and among `audio/webm`
    /// representations the first with the highest bandwidth wins.
    pub fn pick_audio(&self) -> Option<&Representation> {
        let mut best: Option<&Representation> = None;
        for rep in self.representations.iter().filter(|r| r.is_audio_webm()) {
            if best.is_none_or(|b| rep.bandwidth > b.bandwidth) {
                best = Some(rep);
            }
        }
        best
    }
}

/// Segment addressing collected at one level (adaptation set or
/// representation). Representation values override inherited ones.
#[derive(Debug, Clone, Default)]
struct SegmentInfo {
    initialization: Option<String>,
    media: Option<String>,
    list: Option<Vec<String>>,
    start_number: Option<u64>,
    timescale: Option<u64>,
    duration: Option<u64>,
    timeline: Vec<u64>,
    next_time: u64,
}

impl SegmentInfo {
    fn inherit(self, parent: &SegmentInfo) -> SegmentInfo {
        SegmentInfo {
            initialization: self.initialization.or_else(|| parent.initialization.clone()),
            media: self.media.or_else(|| parent.media.clone()),
            list: self.list.or_else(|| parent.list.clone()),
            start_number: self.start_number.or(parent.start_number),
            timescale: self.timescale.or(parent.timescale),
            duration: self.duration.or(parent.duration),
            timeline: if self.timeline.is_empty() {
                parent.timeline.clone()
            } else {
                self.timeline
            },
            next_time: self.next_time,
        }
    }

    fn into_segments(self, presentation_secs: Option<f64>) -> Segments {
        if let Some(media) = self.list {
            return Segments::List {
                initialization: self.initialization,
                media,
            };
        }
        let Some(media) = self.media else {
            return Segments::Single;
        };
        let count = if !self.timeline.is_empty() {
            Some(self.timeline.len() as u64)
        } else {
            match (self.duration, presentation_secs) {
                (Some(d), Some(secs)) if d > 0 => {
                    let timescale = self.timescale.unwrap_or(1) as f64;
                    Some((secs * timescale / d as f64).ceil() as u64)
                }
                _ => None,
            }
        };
        Segments::Template {
            initialization: self.initialization,
            media,
            start_number: self.start_number.unwrap_or(1),
            times: self.timeline,
            count,
        }
    }
}

#[derive(Debug, Default)]
struct AdaptationScope {
    mime_type: String,
    base_url: Option<String>,
    segments: SegmentInfo,
}

#[derive(Debug, Default)]
struct RepresentationScope {
    id: String,
    bandwidth: u64,
    mime_type: Option<String>,
    codecs: String,
    base_url: Option<String>,
    segments: SegmentInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Mpd,
    Period,
    Adaptation,
    Representation,
}

struct ManifestBuilder {
    manifest_url: Url,
    presentation_secs: Option<f64>,
    mpd_base: Option<String>,
    period_base: Option<String>,
    adaptation: Option<AdaptationScope>,
    representation: Option<RepresentationScope>,
    in_base_url: bool,
    in_timeline: bool,
    representations: Vec<Representation>,
}

impl ManifestBuilder {
    fn level(&self) -> Level {
        if self.representation.is_some() {
            Level::Representation
        } else if self.adaptation.is_some() {
            Level::Adaptation
        } else if self.period_base.is_some() {
            Level::Period
        } else {
            Level::Mpd
        }
    }

    /// Segment info of the innermost open scope.
    fn segments_mut(&mut self) -> Option<&mut SegmentInfo> {
        if let Some(rep) = self.representation.as_mut() {
            Some(&mut rep.segments)
        } else {
            self.adaptation.as_mut().map(|a| &mut a.segments)
        }
    }

    fn start(&mut self, e: &BytesStart<'_>) -> Result<(), TransportError> {
        match e.local_name().as_ref() {
            b"MPD" => {
                self.presentation_secs = attr(e, "mediaPresentationDuration")?
                    .as_deref()
                    .and_then(parse_iso_duration);
            }
            b"Period" => {
                // Marks the period scope as open even without a BaseURL.
                self.period_base.get_or_insert_with(String::new);
            }
            b"AdaptationSet" => {
                self.adaptation = Some(AdaptationScope {
                    mime_type: attr(e, "mimeType")?.unwrap_or_default(),
                    ..Default::default()
                });
            }
            b"Representation" => {
                self.representation = Some(RepresentationScope {
                    id: attr(e, "id")?.unwrap_or_default(),
                    bandwidth: attr(e, "bandwidth")?
                        .and_then(|b| b.parse().ok())
                        .unwrap_or(0),
                    mime_type: attr(e, "mimeType")?,
                    codecs: attr(e, "codecs")?.unwrap_or_default(),
                    ..Default::default()
                });
            }
            b"BaseURL" => self.in_base_url = true,
            b"SegmentTemplate" => {
                let initialization = attr(e, "initialization")?;
                let media = attr(e, "media")?;
                let start_number = attr(e, "startNumber")?.and_then(|v| v.parse().ok());
                let timescale = attr(e, "timescale")?.and_then(|v| v.parse().ok());
                let duration = attr(e, "duration")?.and_then(|v| v.parse().ok());
                if let Some(seg) = self.segments_mut() {
                    seg.initialization = initialization.or(seg.initialization.take());
                    seg.media = media.or(seg.media.take());
                    seg.start_number = start_number.or(seg.start_number);
                    seg.timescale = timescale.or(seg.timescale);
                    seg.duration = duration.or(seg.duration);
                }
            }
            b"SegmentTimeline" => self.in_timeline = true,
            b"S" if self.in_timeline => {
                let t: Option<u64> = attr(e, "t")?.and_then(|v| v.parse().ok());
                let d: u64 = attr(e, "d")?.and_then(|v| v.parse().ok()).unwrap_or(0);
                // r="-1" (repeat until the next S / period end) is treated as a single segment.
                let r: i64 = attr(e, "r")?.and_then(|v| v.parse().ok()).unwrap_or(0);
                if let Some(seg) = self.segments_mut() {
                    let repeats = usize::try_from(r.max(0)).unwrap_or(usize::MAX);
                    if repeats >= MAX_TIMELINE_SEGMENTS.saturating_sub(seg.timeline.len()) {
                        return Err(TransportError::Manifest(format!(
                            "segment timeline longer than {MAX_TIMELINE_SEGMENTS} segments"
                        )));
                    }
                    let mut time = t.unwrap_or(seg.next_time);
                    for _ in 0..=repeats {
                        seg.timeline.push(time);
                        time += d;
                    }
                    seg.next_time = time;
                }
            }
            b"SegmentList" => {
                let duration = attr(e, "duration")?.and_then(|v| v.parse().ok());
                if let Some(seg) = self.segments_mut() {
                    seg.list.get_or_insert_with(Vec::new);
                    seg.duration = duration.or(seg.duration);
                }
            }
            b"Initialization" => {
                let source = attr(e, "sourceURL")?;
                if let Some(seg) = self.segments_mut() {
                    seg.initialization = source.or(seg.initialization.take());
                }
            }
            b"SegmentURL" => {
                if let Some(media) = attr(e, "media")? {
                    if let Some(seg) = self.segments_mut() {
                        seg.list.get_or_insert_with(Vec::new).push(media);
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn end(&mut self, name: &[u8]) -> Result<(), TransportError> {
        match name {
            b"Representation" => self.finish_representation()?,
            b"AdaptationSet" => self.adaptation = None,
            b"BaseURL" => self.in_base_url = false,
            b"SegmentTimeline" => self.in_timeline = false,
            _ => {}
        }
        Ok(())
    }

    fn text(&mut self, text: String) {
        if !self.in_base_url {
            return;
        }
        let text = text.trim().to_string();
        match self.level() {
            Level::Representation => {
                if let Some(rep) = self.representation.as_mut() {
                    rep.base_url = Some(text);
                }
            }
            Level::Adaptation => {
                if let Some(set) = self.adaptation.as_mut() {
                    set.base_url = Some(text);
                }
            }
            Level::Period => self.period_base = Some(text),
            Level::Mpd => self.mpd_base = Some(text),
        }
    }

    fn finish_representation(&mut self) -> Result<(), TransportError> {
        let Some(rep) = self.representation.take() else {
            return Ok(());
        };
        let empty = AdaptationScope::default();
        let set = self.adaptation.as_ref().unwrap_or(&empty);

        // Resolve BaseURLs outermost first; each level is relative to the one above.
        let mut base = self.manifest_url.clone();
        for level in [
            self.mpd_base.as_deref(),
            self.period_base.as_deref().filter(|b| !b.is_empty()),
            set.base_url.as_deref(),
            rep.base_url.as_deref(),
        ]
        .into_iter()
        .flatten()
        {
            base = base
                .join(level)
                .map_err(|e| TransportError::Manifest(format!("bad BaseURL {level:?}: {e}")))?;
        }

        let segments = rep
            .segments
            .inherit(&set.segments)
            .into_segments(self.presentation_secs);

        self.representations.push(Representation {
            id: rep.id,
            bandwidth: rep.bandwidth,
            mime_type: rep.mime_type.unwrap_or_else(|| set.mime_type.clone()),
            codecs: rep.codecs,
            base_url: base,
            segments,
        });
        Ok(())
    }
}

fn attr(e: &BytesStart<'_>, key: &str) -> Result<Option<String>, TransportError> {
    for a in e.attributes() {
        let a = a.map_err(|err| TransportError::Manifest(err.to_string()))?;
        if a.key.local_name().as_ref() == key.as_bytes() {
            let value = a
                .unescape_value()
                .map_err(|err| TransportError::Manifest(err.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// `PT1H2M3.5S` style durations, in seconds.
pub fn parse_iso_duration(value: &str) -> Option<f64> {
    let rest = value.strip_prefix("PT")?;
    let mut total = 0.0;
    let mut number = String::new();
    for c in rest.chars() {
        match c {
            '0'..='9' | '.' => number.push(c),
            'H' | 'M' | 'S' => {
                let n: f64 = number.parse().ok()?;
                number.clear();
                total += n * match c {
                    'H' => 3600.0,
                    'M' => 60.0,
                    _ => 1.0,
                };
            }
            _ => return None,
        }
    }
    number.is_empty().then_some(total)
}

/// Parse an MPD document fetched from `manifest_url`.
pub fn parse_manifest(xml: &str, manifest_url: &str) -> Result<Manifest, TransportError> {
    let manifest_url = Url::parse(manifest_url)
        .map_err(|e| TransportError::Manifest(format!("bad manifest url: {e}")))?;

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut builder = ManifestBuilder {
        manifest_url,
        presentation_secs: None,
        mpd_base: None,
        period_base: None,
        adaptation: None,
        representation: None,
        in_base_url: false,
        in_timeline: false,
        representations: Vec::new(),
    };

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => builder.start(e)?,
            Ok(Event::Empty(ref e)) => {
                builder.start(e)?;
                let name = e.local_name();
                builder.end(name.as_ref())?;
            }
            Ok(Event::End(ref e)) => {
                let name = e.local_name();
                builder.end(name.as_ref())?;
            }
            Ok(Event::Text(ref t)) => {
                let raw = String::from_utf8_lossy(t.as_ref());
                let text = unescape(&raw).map_err(|err| TransportError::Manifest(err.to_string()))?;
                builder.text(text.into_owned());
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(TransportError::Manifest(format!(
                    "xml error at {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
    }

    Ok(Manifest {
        representations: builder.representations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST_URL: &str = "https://manifest.googlevideo.com/api/manifest/dash/id/abc";

    const SEGMENT_LIST_MPD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<MPD xmlns="urn:mpeg:DASH:schema:MPD:2011" type="static" mediaPresentationDuration="PT12S">
  <Period>
    <AdaptationSet mimeType="audio/webm" subsegmentAlignment="true">
      <Representation id="250" codecs="opus" bandwidth="70000">
        <BaseURL>https://rr1.googlevideo.com/videoplayback/id/abc/itag/250/</BaseURL>
        <SegmentList>
          <Initialization sourceURL="sq/0"/>
          <SegmentURL media="sq/1"/>
          <SegmentURL media="sq/2"/>
        </SegmentList>
      </Representation>
      <Representation id="251" codecs="opus" bandwidth="160000">
        <BaseURL>https://rr1.googlevideo.com/videoplayback/id/abc/itag/251/</BaseURL>
        <SegmentList>
          <Initialization sourceURL="sq/0"/>
          <SegmentURL media="sq/1"/>
          <SegmentURL media="sq/2"/>
          <SegmentURL media="sq/3"/>
        </SegmentList>
      </Representation>
    </AdaptationSet>
    <AdaptationSet mimeType="video/webm">
      <Representation id="248" codecs="vp9" bandwidth="2500000">
        <BaseURL>https://rr1.googlevideo.com/videoplayback/id/abc/itag/248/</BaseURL>
      </Representation>
    </AdaptationSet>
    <AdaptationSet mimeType="audio/mp4">
      <Representation id="140" codecs="mp4a.40.2" bandwidth="999999"/>
    </AdaptationSet>
  </Period>
</MPD>"#;

    #[test]
    fn picks_highest_bandwidth_audio_webm() {
        let manifest = parse_manifest(SEGMENT_LIST_MPD, MANIFEST_URL).unwrap();
        assert_eq!(manifest.representations.len(), 4);

        let rep = manifest.pick_audio().unwrap();
        assert_eq!(rep.id, "251");
        assert_eq!(rep.mime_type, "audio/webm");
        assert_eq!(rep.segment_count(), Some(4));
        assert_eq!(
            rep.segment_url(0).unwrap().as_str(),
            "https://rr1.googlevideo.com/videoplayback/id/abc/itag/251/sq/0"
        );
        assert_eq!(
            rep.segment_url(3).unwrap().as_str(),
            "https://rr1.googlevideo.com/videoplayback/id/abc/itag/251/sq/3"
        );
        assert_eq!(rep.segment_url(4), None);
    }

    #[test]
    fn template_with_timeline() {
        let mpd = r#"<MPD mediaPresentationDuration="PT6S">
          <BaseURL>https://cdn.example/media/</BaseURL>
          <Period>
            <AdaptationSet mimeType="audio/webm">
              <SegmentTemplate timescale="1000" initialization="$RepresentationID$/init.webm" media="$RepresentationID$/$Time$.webm" startNumber="5">
                <SegmentTimeline>
                  <S t="0" d="2000" r="1"/>
                  <S d="2000"/>
                </SegmentTimeline>
              </SegmentTemplate>
              <Representation id="opus" bandwidth="128000" codecs="opus"/>
            </AdaptationSet>
          </Period>
        </MPD>"#;

        let manifest = parse_manifest(mpd, MANIFEST_URL).unwrap();
        let rep = manifest.pick_audio().unwrap();
        assert_eq!(rep.segment_count(), Some(4));
        let urls: Vec<String> = (0..4)
            .filter_map(|i| rep.segment_url(i))
            .map(|u| u.to_string())
            .collect();
        assert_eq!(
            urls,
            vec![
                "https://cdn.example/media/opus/init.webm",
                "https://cdn.example/media/opus/0.webm",
                "https://cdn.example/media/opus/2000.webm",
                "https://cdn.example/media/opus/4000.webm",
            ]
        );
    }

    #[test]
    fn oversized_timeline_repeat_is_rejected() {
        let mpd = r#"<MPD><Period>
            <AdaptationSet mimeType="audio/webm">
              <Representation id="a" bandwidth="1">
                <SegmentTemplate timescale="1000" media="$Time$.webm">
                  <SegmentTimeline><S t="0" d="1" r="200000000"/></SegmentTimeline>
                </SegmentTemplate>
              </Representation>
            </AdaptationSet></Period></MPD>"#;

        match parse_manifest(mpd, MANIFEST_URL) {
            Err(TransportError::Manifest(msg)) => assert!(msg.contains("timeline"), "{msg}"),
            other => panic!("expected a manifest error, got {other:?}"),
        }
    }

    #[test]
    fn timeline_cap_counts_every_entry() {
        let entry = format!(r#"<S d="1" r="{}"/>"#, MAX_TIMELINE_SEGMENTS / 2 - 1);
        let mpd = format!(
            r#"<MPD><Period><AdaptationSet mimeType="audio/webm">
              <Representation id="a" bandwidth="1">
                <SegmentTemplate timescale="1000" media="$Time$.webm">
                  <SegmentTimeline>{entry}{entry}<S d="1"/></SegmentTimeline>
                </SegmentTemplate>
              </Representation>
            </AdaptationSet></Period></MPD>"#
        );
        assert!(matches!(
            parse_manifest(&mpd, MANIFEST_URL),
            Err(TransportError::Manifest(_))
        ));

        let mpd = mpd.replace(r#"<S d="1"/>"#, "");
        let manifest = parse_manifest(&mpd, MANIFEST_URL).unwrap();
        let rep = manifest.pick_audio().unwrap();
        assert_eq!(rep.segment_count(), Some(MAX_TIMELINE_SEGMENTS));
    }

    #[test]
    fn template_count_from_presentation_duration() {
        let mpd = r#"<MPD mediaPresentationDuration="PT1M0.5S"><Period>
            <AdaptationSet mimeType="audio/webm">
              <Representation id="a" bandwidth="1">
                <SegmentTemplate timescale="48000" duration="480000" media="seg-$Number$.webm"/>
              </Representation>
            </AdaptationSet></Period></MPD>"#;

        let manifest = parse_manifest(mpd, "https://cdn.example/x/manifest.mpd").unwrap();
        let rep = manifest.pick_audio().unwrap();
        // 60.5 s / 10 s per segment, no initialisation segment.
        assert_eq!(rep.segment_count(), Some(7));
        assert_eq!(
            rep.segment_url(0).unwrap().as_str(),
            "https://cdn.example/x/seg-1.webm"
        );
    }

    #[test]
    fn no_audio_webm_means_no_pick() {
        let mpd = r#"<MPD><Period><AdaptationSet mimeType="audio/mp4">
            <Representation id="140" bandwidth="128000"/></AdaptationSet></Period></MPD>"#;
        let manifest = parse_manifest(mpd, MANIFEST_URL).unwrap();
        assert!(manifest.pick_audio().is_none());
    }

    #[test]
    fn iso_durations() {
        assert_eq!(parse_iso_duration("PT12S"), Some(12.0));
        assert_eq!(parse_iso_duration("PT1H2M3.5S"), Some(3723.5));
        assert_eq!(parse_iso_duration("P1D"), None);
    }

    #[test]
    fn broken_xml_is_a_manifest_error() {
        let err = parse_manifest("<MPD><Period></MPD>", MANIFEST_URL).unwrap_err();
        assert!(matches!(err, TransportError::Manifest(_)));
    }
}
