//! DASH MPDs with SCTE-35 EventStreams.

use std::io::{Cursor, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use spliceforge_common::AdMarker;

use super::placement::{layout, Interval, Placement};
use super::{EmbeddedManifest, PlacementWarning};
use crate::error::ManifestResult;
use crate::scte35::{encode_marker_section, splice_event_id_for, CueSettings, PTS_TIMESCALE};

pub const SCTE35_SCHEME_ID: &str = "urn:scte:scte35:2013:xml";
const SCTE35_SIGNAL_NS: &str = "http://www.scte.org/schemas/35/2016";

/// A DASH period on the stream timeline.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Period {
    pub id: String,
    /// Absolute start in stream seconds.
    pub start: f64,
    /// Duration in seconds.
    pub duration: f64,
    pub adaptation_sets: Vec<AdaptationSet>,
}

impl Period {
    pub fn new(id: impl Into<String>, start: f64, duration: f64) -> Self {
        Self {
            id: id.into(),
            start,
            duration,
            adaptation_sets: Vec::new(),
        }
    }

    pub fn with_adaptation_set(mut self, set: AdaptationSet) -> Self {
        self.adaptation_sets.push(set);
        self
    }
}

impl Interval for Period {
    fn start(&self) -> f64 {
        self.start
    }
    fn duration(&self) -> f64 {
        self.duration
    }
}

/// An adaptation set with a 90 kHz SegmentTimeline.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct AdaptationSet {
    pub id: String,
    /// "video" or "audio".
    pub content_type: String,
    pub mime_type: String,
    pub codecs: String,
    pub bandwidth: u32,
    /// Segment durations in seconds, in timeline order.
    pub segment_durations: Vec<f64>,
}

/// MPD rendering options.
#[derive(Debug, Clone, PartialEq)]
pub struct DashOptions {
    pub min_buffer_secs: f64,
    pub suggested_presentation_delay_secs: f64,
    /// Parameters for the sections carried in `<Binary>`.
    pub cue: CueSettings,
}

impl Default for DashOptions {
    fn default() -> Self {
        Self {
            min_buffer_secs: 2.0,
            suggested_presentation_delay_secs: 10.0,
            cue: CueSettings::default(),
        }
    }
}

/// Render an MPD with SCTE-35 EventStreams using default options.
pub fn embed_dash(periods: &[Period], markers: &[AdMarker]) -> ManifestResult<EmbeddedManifest> {
    embed_dash_with(periods, markers, &DashOptions::default())
}

/// Render an MPD with one SCTE-35 EventStream per period that has markers.
///
/// Event times are period-relative in 90 kHz ticks. A marker whose cue
/// cannot be encoded is left out and reported as a warning.
pub fn embed_dash_with(
    periods: &[Period],
    markers: &[AdMarker],
    options: &DashOptions,
) -> ManifestResult<EmbeddedManifest> {
    let placed = layout(periods, markers);
    let mut warnings = placed.warnings;

    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut mpd = BytesStart::new("MPD");
    mpd.push_attribute(("xmlns", "urn:mpeg:dash:schema:mpd:2011"));
    mpd.push_attribute(("profiles", "urn:mpeg:dash:profile:isoff-live:2011"));
    mpd.push_attribute(("type", "dynamic"));
    mpd.push_attribute(("minBufferTime", iso_duration(options.min_buffer_secs).as_str()));
    mpd.push_attribute((
        "suggestedPresentationDelay",
        iso_duration(options.suggested_presentation_delay_secs).as_str(),
    ));
    writer.write_event(Event::Start(mpd))?;

    for (period, slot) in periods.iter().zip(&placed.slots) {
        let mut period_el = BytesStart::new("Period");
        period_el.push_attribute(("id", period.id.as_str()));
        period_el.push_attribute(("start", iso_duration(period.start).as_str()));
        period_el.push_attribute(("duration", iso_duration(period.duration).as_str()));
        writer.write_event(Event::Start(period_el))?;

        let mut events = Vec::with_capacity(slot.len());
        for placement in slot {
            match encode_marker_section(placement.marker, &options.cue) {
                Ok(section) => events.push((placement, section)),
                Err(e) => warnings.push(PlacementWarning::new(
                    placement.marker,
                    format!("cue not embedded: {}", e),
                )),
            }
        }

        if !events.is_empty() {
            let mut stream = BytesStart::new("EventStream");
            stream.push_attribute(("schemeIdUri", SCTE35_SCHEME_ID));
            stream.push_attribute(("value", "scte35"));
            stream.push_attribute(("timescale", PTS_TIMESCALE.to_string().as_str()));
            writer.write_event(Event::Start(stream))?;
            for (placement, section) in &events {
                write_scte35_event(&mut writer, placement, section)?;
            }
            writer.write_event(Event::End(BytesEnd::new("EventStream")))?;
        }

        for set in &period.adaptation_sets {
            write_adaptation_set(&mut writer, set)?;
        }

        writer.write_event(Event::End(BytesEnd::new("Period")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("MPD")))?;

    let mut text = String::from_utf8(writer.into_inner().into_inner())?;
    text.push('\n');

    Ok(EmbeddedManifest { text, warnings })
}

fn write_scte35_event<W: Write>(
    writer: &mut Writer<W>,
    placement: &Placement<'_>,
    section: &[u8],
) -> ManifestResult<()> {
    let marker = placement.marker;

    let mut event = BytesStart::new("Event");
    event.push_attribute(("presentationTime", ticks(placement.offset).to_string().as_str()));
    event.push_attribute(("duration", ticks(marker.duration).to_string().as_str()));
    event.push_attribute(("id", splice_event_id_for(marker).to_string().as_str()));
    writer.write_event(Event::Start(event))?;

    let mut signal = BytesStart::new("Signal");
    signal.push_attribute(("xmlns", SCTE35_SIGNAL_NS));
    writer.write_event(Event::Start(signal))?;

    let binary = STANDARD.encode(section);
    writer.write_event(Event::Start(BytesStart::new("Binary")))?;
    writer.write_event(Event::Text(BytesText::new(&binary)))?;
    writer.write_event(Event::End(BytesEnd::new("Binary")))?;

    writer.write_event(Event::End(BytesEnd::new("Signal")))?;
    writer.write_event(Event::End(BytesEnd::new("Event")))?;
    Ok(())
}

fn write_adaptation_set<W: Write>(writer: &mut Writer<W>, set: &AdaptationSet) -> ManifestResult<()> {
    let mut el = BytesStart::new("AdaptationSet");
    el.push_attribute(("id", set.id.as_str()));
    el.push_attribute(("contentType", set.content_type.as_str()));
    el.push_attribute(("mimeType", set.mime_type.as_str()));
    el.push_attribute(("codecs", set.codecs.as_str()));
    el.push_attribute(("bandwidth", set.bandwidth.to_string().as_str()));
    writer.write_event(Event::Start(el))?;

    let mut template = BytesStart::new("SegmentTemplate");
    template.push_attribute(("timescale", PTS_TIMESCALE.to_string().as_str()));
    writer.write_event(Event::Start(template))?;
    writer.write_event(Event::Start(BytesStart::new("SegmentTimeline")))?;

    let mut t = 0u64;
    for duration in &set.segment_durations {
        let d = ticks(*duration);
        let mut s = BytesStart::new("S");
        s.push_attribute(("t", t.to_string().as_str()));
        s.push_attribute(("d", d.to_string().as_str()));
        writer.write_event(Event::Empty(s))?;
        t += d;
    }

    writer.write_event(Event::End(BytesEnd::new("SegmentTimeline")))?;
    writer.write_event(Event::End(BytesEnd::new("SegmentTemplate")))?;
    writer.write_event(Event::End(BytesEnd::new("AdaptationSet")))?;
    Ok(())
}

fn ticks(seconds: f64) -> u64 {
    (seconds * PTS_TIMESCALE as f64).round() as u64
}

fn iso_duration(seconds: f64) -> String {
    format!("PT{}S", seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scte35::{decode_section, SpliceCommand};
    use spliceforge_common::AdType;

    fn periods() -> Vec<Period> {
        vec![
            Period::new("p0", 0.0, 30.0).with_adaptation_set(AdaptationSet {
                id: "v".into(),
                content_type: "video".into(),
                mime_type: "video/mp4".into(),
                codecs: "avc1.64001f".into(),
                bandwidth: 3_000_000,
                segment_durations: vec![6.0, 6.0],
            }),
            Period::new("p1", 30.0, 30.0),
        ]
    }

    #[test]
    fn event_stream_per_period_with_markers() {
        let markers = vec![
            AdMarker::new("a", "cue-1", 40.0, 15.0, AdType::ProviderAd),
            AdMarker::new("b", "cue-2", 35.0, 10.0, AdType::LocalAd),
        ];
        let manifest = embed_dash(&periods(), &markers).unwrap();
        assert!(manifest.is_clean());

        let text = &manifest.text;
        assert_eq!(text.matches("<EventStream").count(), 1);
        let p1 = text.find("<Period id=\"p1\"").unwrap();
        let stream = text.find("<EventStream").unwrap();
        assert!(stream > p1);

        // Period-relative, ascending
        let b = text.find("presentationTime=\"450000\" duration=\"900000\"").unwrap();
        let a = text.find("presentationTime=\"900000\" duration=\"1350000\"").unwrap();
        assert!(b < a);
    }

    #[test]
    fn binary_carries_the_marker_section() {
        let marker = AdMarker::new("a", "cue-1", 10.0, 30.0, AdType::ProviderAd);
        let text = embed_dash(&periods(), std::slice::from_ref(&marker)).unwrap().text;

        let start = text.find("<Binary>").unwrap() + "<Binary>".len();
        let end = text.find("</Binary>").unwrap();
        let section = STANDARD.decode(&text[start..end]).unwrap();

        match decode_section(&section).unwrap().command {
            SpliceCommand::SpliceInsert(insert) => {
                assert_eq!(insert.event_id, splice_event_id_for(&marker));
                assert_eq!(insert.pts_time, Some(900_000));
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert!(text.contains(&format!("id=\"{}\"", splice_event_id_for(&marker))));
    }

    #[test]
    fn segment_timeline_is_cumulative() {
        let text = embed_dash(&periods(), &[]).unwrap().text;
        assert!(text.contains("<S t=\"0\" d=\"540000\"/>"));
        assert!(text.contains("<S t=\"540000\" d=\"540000\"/>"));
        assert!(!text.contains("<EventStream"));
    }

    #[test]
    fn unencodable_marker_is_a_warning() {
        let markers = vec![AdMarker::new("a", "cue-1", 5.0, 200_000.0, AdType::LocalAd)];
        let manifest = embed_dash(&periods(), &markers).unwrap();
        assert_eq!(manifest.warnings.len(), 1);
        assert!(!manifest.text.contains("<EventStream"));
    }

    #[test]
    fn output_is_well_formed_and_escaped() {
        let periods = vec![Period::new("ad & <break>", 0.0, 30.0)];
        let markers = vec![
            AdMarker::new("a", "cue-1", 5.0, 10.0, AdType::LocalAd),
            AdMarker::new("b", "cue-2", 15.0, 10.0, AdType::LocalAd),
        ];
        let text = embed_dash(&periods, &markers).unwrap().text;
        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(text.contains("id=\"ad &amp; &lt;break&gt;\""));

        let mut reader = quick_xml::Reader::from_str(&text);
        let mut events = 0;
        let mut period_id = None;
        loop {
            match reader.read_event().unwrap() {
                Event::Start(e) if e.name().as_ref() == b"Event" => events += 1,
                Event::Start(e) if e.name().as_ref() == b"Period" => {
                    let id = e.try_get_attribute("id").unwrap().unwrap();
                    period_id = Some(id.unescape_value().unwrap().into_owned());
                }
                Event::Eof => break,
                _ => {}
            }
        }
        assert_eq!(events, 2);
        assert_eq!(period_id.as_deref(), Some("ad & <break>"));
    }

    #[test]
    fn rendering_is_repeatable() {
        let markers = vec![AdMarker::new("a", "cue-1", 70.0, 15.0, AdType::NetworkAd)];
        assert_eq!(
            embed_dash(&periods(), &markers).unwrap(),
            embed_dash(&periods(), &markers).unwrap()
        );
    }
}
