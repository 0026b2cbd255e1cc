use crate::config::OutputKind;
use crate::error::{Result, SplitError};
use crate::{BoundingBox, TrackPoint};
use log::{debug, info};
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesDecl, BytesEnd, BytesRef, BytesStart, BytesText, Event};
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};
use std::borrow::Cow;
use std::fs;
use std::io::Write;
use std::path::Path;
use time::OffsetDateTime;
use time::format_description::well_known::{Iso8601, Rfc3339};

pub const GPX_NAMESPACE: &str = "http://www.topografix.com/GPX/1/1";
pub const GPX_VERSION: &str = "1.1";
pub const CREATOR: &str = env!("CARGO_PKG_NAME");
pub const UNNAMED: &str = "Unnamed";

/// Document-level details of the input that carry over to every output file.
#[derive(Debug, Clone)]
pub struct TrackInfo {
    pub name: String,
    /// Raw `(key, value)` of each `xmlns:*` prefix declared outside the points.
    namespaces: Vec<(Vec<u8>, Vec<u8>)>,
}

impl TrackInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespaces: Vec::new(),
        }
    }

    /// `xmlns:*` declarations from `<gpx>` and the elements enclosing the
    /// points. Point content refers to these prefixes, so every output root
    /// has to redeclare them.
    pub fn namespace_declarations(&self) -> Vec<Attribute<'_>> {
        self.namespaces
            .iter()
            .map(|(key, value)| Attribute {
                key: QName(key.as_slice()),
                value: Cow::Borrowed(value.as_slice()),
            })
            .collect()
    }

    /// Records the prefix declarations of `start`. The first URI seen for a
    /// prefix wins.
    fn declare_namespaces(&mut self, start: &BytesStart) {
        for attr in start.attributes().flatten() {
            let key = attr.key.as_ref();
            let declared = self.namespaces.iter().any(|(known, _)| known.as_slice() == key);
            if key.starts_with(b"xmlns:") && !declared {
                self.namespaces.push((key.to_vec(), attr.value.into_owned()));
            }
        }
    }
}

impl Default for TrackInfo {
    fn default() -> Self {
        Self::new(UNNAMED)
    }
}

#[derive(Debug, Clone)]
pub struct Track {
    pub info: TrackInfo,
    pub points: Vec<TrackPoint>,
}

pub fn load_track(path: &Path) -> Result<Track> {
    let input = fs::read(path).map_err(|source| SplitError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let track = parse_track(&input)?;
    info!(
        "loaded {} points from {} ({})",
        track.points.len(),
        path.display(),
        track.info.name
    );
    Ok(track)
}

enum NameSource {
    Metadata,
    Track,
}

/// Which document name a `<name>` element at this position provides, if any.
fn name_source(stack: &[Vec<u8>]) -> Option<NameSource> {
    match stack {
        [_, parent, name] if name.as_slice() == b"name" && parent.as_slice() == b"metadata" => {
            Some(NameSource::Metadata)
        }
        [_, parent, name] if name.as_slice() == b"name" && parent.as_slice() == b"trk" => {
            Some(NameSource::Track)
        }
        _ => None,
    }
}

/// Resolves `&amp;`-style and numeric references; unknown entities are kept as written.
fn resolve_reference(reference: &BytesRef) -> String {
    if let Ok(Some(ch)) = reference.resolve_char_ref() {
        return ch.to_string();
    }
    let name = String::from_utf8_lossy(reference);
    match quick_xml::escape::resolve_predefined_entity(&name) {
        Some(text) => text.to_string(),
        None => format!("&{name};"),
    }
}

fn check_root(start: &BytesStart, closed_root: bool) -> Result<()> {
    if closed_root {
        Err(SplitError::Parse(format!(
            "unexpected <{}> after the <gpx> element",
            String::from_utf8_lossy(start.name().as_ref())
        )))
    } else if start.local_name().as_ref() == b"gpx" {
        Ok(())
    } else {
        Err(SplitError::Parse(format!(
            "expected <gpx> root element, found <{}>",
            String::from_utf8_lossy(start.name().as_ref())
        )))
    }
}

fn coordinate(start: &BytesStart, key: &[u8], limit: f64, index: usize) -> Result<f64> {
    start
        .attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key)
        .and_then(|attr| {
            std::str::from_utf8(&attr.value)
                .ok()
                .and_then(|text| text.trim().parse::<f64>().ok())
        })
        .filter(|value| value.is_finite() && value.abs() <= limit)
        .ok_or_else(|| {
            SplitError::Parse(format!(
                "trkpt #{index} has a missing or invalid {} attribute",
                String::from_utf8_lossy(key)
            ))
        })
}

struct PointBuilder {
    lat: f64,
    lon: f64,
    start: BytesStart<'static>,
    content: Vec<Event<'static>>,
    time_text: String,
    depth: usize,
}

impl PointBuilder {
    fn new(start: BytesStart<'static>, depth: usize, index: usize) -> Result<Self> {
        let lat = coordinate(&start, b"lat", 90.0, index)?;
        let lon = coordinate(&start, b"lon", 180.0, index)?;
        Ok(Self {
            lat,
            lon,
            start,
            content: Vec::new(),
            time_text: String::new(),
            depth,
        })
    }

    fn finish(self) -> TrackPoint {
        let time = OffsetDateTime::parse(self.time_text.trim(), &Iso8601::DEFAULT).ok();
        TrackPoint {
            lat: self.lat,
            lon: self.lon,
            time,
            start: self.start,
            content: self.content,
        }
    }
}

/// Reads every `<trkpt>` of a GPX document in document order.
///
/// Segment and track boundaries are flattened away. Whitespace-only text
/// inside points is dropped; all other child content is kept as-is.
pub fn parse_track(input: &[u8]) -> Result<Track> {
    let mut reader = Reader::from_reader(input);
    let mut buf = Vec::new();

    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut info = TrackInfo::default();
    let mut seen_root = false;
    let mut closed_root = false;
    let mut metadata_name: Option<String> = None;
    let mut track_name: Option<String> = None;
    let mut name_text = String::new();
    let mut current: Option<PointBuilder> = None;
    let mut points = Vec::new();

    loop {
        let event = match reader.read_event_into(&mut buf) {
            Err(e) => {
                return Err(SplitError::Parse(format!(
                    "Error at position {}: {:?}",
                    reader.buffer_position(),
                    e
                )));
            }
            Ok(Event::Eof) => break,
            Ok(event) => event.into_owned(),
        };
        buf.clear();

        match event {
            Event::Start(e) => {
                if stack.is_empty() {
                    check_root(&e, closed_root)?;
                    seen_root = true;
                }
                stack.push(e.local_name().as_ref().to_vec());

                if let Some(point) = current.as_mut() {
                    point.content.push(Event::Start(e));
                } else if e.local_name().as_ref() == b"trkpt" {
                    current = Some(PointBuilder::new(e, stack.len(), points.len() + 1)?);
                } else {
                    info.declare_namespaces(&e);
                    if name_source(&stack).is_some() {
                        name_text.clear();
                    }
                }
            }

            Event::Empty(e) => {
                if stack.is_empty() {
                    check_root(&e, closed_root)?;
                    seen_root = true;
                    closed_root = true;
                }

                if let Some(point) = current.as_mut() {
                    point.content.push(Event::Empty(e));
                } else if e.local_name().as_ref() == b"trkpt" {
                    points.push(PointBuilder::new(e, 0, points.len() + 1)?.finish());
                }
            }

            Event::End(e) => {
                let depth = stack.len();
                let closing_name = name_source(&stack);
                stack.pop();
                closed_root |= stack.is_empty();

                match current.take() {
                    Some(point) if point.depth == depth => points.push(point.finish()),
                    Some(mut point) => {
                        point.content.push(Event::End(e));
                        current = Some(point);
                    }
                    None => match closing_name {
                        Some(NameSource::Metadata) if metadata_name.is_none() => {
                            metadata_name = Some(name_text.trim().to_string());
                        }
                        Some(NameSource::Track) if track_name.is_none() => {
                            track_name = Some(name_text.trim().to_string());
                        }
                        _ => {}
                    },
                }
            }

            Event::Text(e) => {
                let is_whitespace_only = e.iter().all(|b| b.is_ascii_whitespace());
                if stack.is_empty() && !is_whitespace_only {
                    return Err(SplitError::Parse(format!(
                        "text outside the <gpx> element at position {}",
                        reader.buffer_position()
                    )));
                }

                if let Some(point) = current.as_mut() {
                    if is_whitespace_only {
                        continue;
                    }
                    let in_time = stack.len() == point.depth + 1
                        && stack.last().is_some_and(|name| name.as_slice() == b"time");
                    if in_time && let Ok(text) = std::str::from_utf8(&e) {
                        point.time_text.push_str(text);
                    }
                    point.content.push(Event::Text(e));
                } else if name_source(&stack).is_some()
                    && let Ok(text) = std::str::from_utf8(&e)
                {
                    name_text.push_str(text);
                }
            }

            Event::CData(e) => {
                if let Some(point) = current.as_mut() {
                    point.content.push(Event::CData(e));
                } else if name_source(&stack).is_some()
                    && let Ok(text) = std::str::from_utf8(&e)
                {
                    name_text.push_str(text);
                }
            }

            Event::GeneralRef(e) => {
                if stack.is_empty() {
                    return Err(SplitError::Parse(format!(
                        "entity reference outside the <gpx> element at position {}",
                        reader.buffer_position()
                    )));
                }
                if let Some(point) = current.as_mut() {
                    point.content.push(Event::GeneralRef(e));
                } else if name_source(&stack).is_some() {
                    name_text.push_str(&resolve_reference(&e));
                }
            }

            Event::Decl(_) | Event::DocType(_) => {}

            event => {
                if let Some(point) = current.as_mut() {
                    point.content.push(event);
                }
            }
        }
    }

    if !seen_root {
        return Err(SplitError::Parse("no <gpx> element found".into()));
    }
    if let Some(open) = stack.last() {
        return Err(SplitError::Parse(format!(
            "unexpected end of document inside <{}>",
            String::from_utf8_lossy(open)
        )));
    }

    info.name = metadata_name
        .or(track_name)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| UNNAMED.to_string());
    debug!(
        "parsed {} track points, display name {:?}",
        points.len(),
        info.name
    );

    Ok(Track { info, points })
}

/// One output file's content, borrowing the points it wraps.
#[derive(Debug, Clone)]
pub struct GpxDocument<'a> {
    pub name: String,
    pub time: Option<OffsetDateTime>,
    pub bounds: BoundingBox,
    pub kind: OutputKind,
    pub track_info: &'a TrackInfo,
    pub points: &'a [TrackPoint],
}

impl GpxDocument<'_> {
    pub fn write_to<W: Write>(&self, output: W) -> Result<()> {
        let mut writer = Writer::new_with_indent(output, b' ', 2);

        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut root = BytesStart::new("gpx");
        root.push_attribute(("xmlns", GPX_NAMESPACE));
        root.push_attribute(("version", GPX_VERSION));
        root.push_attribute(("creator", CREATOR));
        for declaration in self.track_info.namespace_declarations() {
            root.push_attribute(declaration);
        }
        writer.write_event(Event::Start(root))?;

        writer.write_event(Event::Start(BytesStart::new("metadata")))?;
        write_text_element(&mut writer, "name", &self.name)?;
        if let Some(time) = self.time {
            write_text_element(&mut writer, "time", &time.format(&Rfc3339)?)?;
        }
        let min_lat = self.bounds.min_lat.to_string();
        let min_lon = self.bounds.min_lon.to_string();
        let max_lat = self.bounds.max_lat.to_string();
        let max_lon = self.bounds.max_lon.to_string();
        writer.write_event(Event::Empty(BytesStart::new("bounds").with_attributes([
            ("minlat", min_lat.as_str()),
            ("minlon", min_lon.as_str()),
            ("maxlat", max_lat.as_str()),
            ("maxlon", max_lon.as_str()),
        ])))?;
        writer.write_event(Event::End(BytesEnd::new("metadata")))?;

        let tag = self.kind.point_tag();
        match self.kind {
            OutputKind::Route => {
                writer.write_event(Event::Start(BytesStart::new("rte")))?;
                write_text_element(&mut writer, "name", &self.name)?;
                for point in self.points {
                    write_point(&mut writer, point, tag)?;
                }
                writer.write_event(Event::End(BytesEnd::new("rte")))?;
            }
            OutputKind::Waypoints => {
                for point in self.points {
                    write_point(&mut writer, point, tag)?;
                }
            }
        }

        writer.write_event(Event::End(BytesEnd::new("gpx")))?;
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        self.write_to(&mut output)?;
        output.push(b'\n');
        Ok(output)
    }
}

fn write_text_element<W: Write>(writer: &mut Writer<W>, tag: &str, text: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

/// Writes a track point under a new element name, copying its attributes and
/// child content unchanged.
fn write_point<W: Write>(writer: &mut Writer<W>, point: &TrackPoint, tag: &str) -> Result<()> {
    let mut start = BytesStart::new(tag);
    for attr in point.start.attributes().flatten() {
        start.push_attribute(attr);
    }

    if !point.has_content() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for event in &point.content {
        writer.write_event(event.clone())?;
    }
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}
