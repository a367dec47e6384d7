//! XMLTV guide writer
//! Plain XML, or gzip-compressed when the target path ends in `.gz`

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, FixedOffset};
use flate2::write::GzEncoder;
use flate2::Compression;
use quick_xml::events::{BytesDecl, BytesText, Event};
use quick_xml::Writer;

use crate::error::ArtifactWriteError;
use crate::models::{Guide, GuideChannel, ProgramEntry};

/// `<tv>` attribution attributes
#[derive(Debug, Clone)]
pub struct Attribution {
    pub generator_name: String,
    pub generator_url: Option<String>,
    pub source_name: String,
    pub source_url: Option<String>,
}

impl Attribution {
    pub fn new(source_name: &str, source_url: &str) -> Self {
        Self {
            generator_name: env!("CARGO_PKG_NAME").to_string(),
            generator_url: None,
            source_name: source_name.to_string(),
            source_url: Some(source_url.to_string()),
        }
    }
}

/// XMLTV timestamp: "20240115120000 +0100"
pub fn format_time(dt: &DateTime<FixedOffset>) -> String {
    dt.format("%Y%m%d%H%M%S %z").to_string()
}

pub fn write_guide(
    path: &Path,
    guide: &Guide,
    attribution: &Attribution,
    lang: &str,
) -> Result<(), ArtifactWriteError> {
    let wrap = |source: io::Error| ArtifactWriteError {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(wrap)?;
    let out = BufWriter::new(file);

    if path.extension().is_some_and(|ext| ext == "gz") {
        let encoder = render_guide(GzEncoder::new(out, Compression::default()), guide, attribution, lang)
            .map_err(wrap)?;
        encoder.finish().and_then(|mut w| w.flush()).map_err(wrap)?;
    } else {
        let mut out = render_guide(out, guide, attribution, lang).map_err(wrap)?;
        out.flush().map_err(wrap)?;
    }
    Ok(())
}

/// Serialize the guide into `out` and hand the sink back.
pub fn render_guide<W: Write>(
    out: W,
    guide: &Guide,
    attribution: &Attribution,
    lang: &str,
) -> io::Result<W> {
    let mut writer = Writer::new_with_indent(out, b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::DocType(BytesText::from_escaped(r#"tv SYSTEM "xmltv.dtd""#)))?;

    let mut tv = writer.create_element("tv");
    if let Some(url) = &attribution.source_url {
        tv = tv.with_attribute(("source-info-url", url.as_str()));
    }
    tv = tv.with_attribute(("source-info-name", attribution.source_name.as_str()));
    tv = tv.with_attribute(("generator-info-name", attribution.generator_name.as_str()));
    if let Some(url) = &attribution.generator_url {
        tv = tv.with_attribute(("generator-info-url", url.as_str()));
    }

    tv.write_inner_content(|w| {
        for channel in &guide.channels {
            write_channel(w, channel, lang)?;
        }
        for program in &guide.programs {
            write_programme(w, program)?;
        }
        Ok(())
    })?;

    let mut out = writer.into_inner();
    out.write_all(b"\n")?;
    Ok(out)
}

fn write_channel<W: Write>(w: &mut Writer<W>, channel: &GuideChannel, lang: &str) -> io::Result<()> {
    w.create_element("channel")
        .with_attribute(("id", channel.id.as_str()))
        .write_inner_content(|w| {
            w.create_element("display-name")
                .with_attribute(("lang", lang))
                .write_text_content(BytesText::new(&channel.display_name))?;
            if let Some(icon) = &channel.icon {
                w.create_element("icon")
                    .with_attribute(("src", icon.as_str()))
                    .write_empty()?;
            }
            Ok(())
        })?;
    Ok(())
}

fn write_programme<W: Write>(w: &mut Writer<W>, program: &ProgramEntry) -> io::Result<()> {
    let start = format_time(&program.start);
    let stop = format_time(&program.stop);

    w.create_element("programme")
        .with_attribute(("start", start.as_str()))
        .with_attribute(("stop", stop.as_str()))
        .with_attribute(("channel", program.channel_guide_id.as_str()))
        .write_inner_content(|w| {
            w.create_element("title")
                .write_text_content(BytesText::new(&program.title))?;
            w.create_element("desc")
                .write_text_content(BytesText::new(&program.description))?;
            if let Some(year) = &program.year {
                w.create_element("date")
                    .write_text_content(BytesText::new(year))?;
            }
            if let Some(genre) = &program.genre {
                w.create_element("category")
                    .write_text_content(BytesText::new(&genre.genre))?;
                w.create_element("category")
                    .write_text_content(BytesText::new(&genre.subgenre))?;
            }
            if let Some(icon) = &program.icon {
                w.create_element("icon")
                    .with_attribute(("src", icon.as_str()))
                    .write_empty()?;
            }
            Ok(())
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Genre;
    use chrono::TimeZone;
    use quick_xml::reader::Reader;

    fn guide() -> Guide {
        let cet = FixedOffset::east_opt(3600).unwrap();
        Guide {
            channels: vec![GuideChannel {
                id: "tm-1-ct1".to_string(),
                display_name: "ČT1 & friends".to_string(),
                icon: Some("http://logo/1.png".to_string()),
            }],
            programs: vec![
                ProgramEntry {
                    channel_guide_id: "tm-1-ct1".to_string(),
                    start: cet.with_ymd_and_hms(2024, 1, 15, 20, 0, 0).unwrap(),
                    stop: cet.with_ymd_and_hms(2024, 1, 15, 21, 0, 0).unwrap(),
                    title: "Zprávy <live>".to_string(),
                    description: "Denní zpravodajství".to_string(),
                    year: Some("2024".to_string()),
                    genre: Some(Genre {
                        genre: "Zpravodajství".to_string(),
                        subgenre: "Domácí".to_string(),
                    }),
                    icon: Some("http://img/1.jpg".to_string()),
                },
                ProgramEntry {
                    channel_guide_id: "tm-1-ct1".to_string(),
                    start: cet.with_ymd_and_hms(2024, 1, 15, 21, 0, 0).unwrap(),
                    stop: cet.with_ymd_and_hms(2024, 1, 15, 22, 0, 0).unwrap(),
                    title: "Film".to_string(),
                    description: String::new(),
                    year: None,
                    genre: None,
                    icon: None,
                },
            ],
        }
    }

    fn render(guide: &Guide) -> String {
        let attribution = Attribution::new("TV GO", "https://czgo.magio.tv");
        let bytes = render_guide(Vec::new(), guide, &attribution, "cs").unwrap();
        String::from_utf8(bytes).unwrap()
    }

    /// Count elements by name with the streaming reader
    fn count_elements(xml: &str, name: &[u8]) -> usize {
        let mut reader = Reader::from_str(xml);
        let mut count = 0;
        loop {
            match reader.read_event().unwrap() {
                Event::Start(e) | Event::Empty(e) if e.name().as_ref() == name => count += 1,
                Event::Eof => break,
                _ => {}
            }
        }
        count
    }

    #[test]
    fn test_format_time() {
        let cet = FixedOffset::east_opt(7200).unwrap();
        let dt = cet.with_ymd_and_hms(2024, 6, 1, 5, 4, 3).unwrap();
        assert_eq!(format_time(&dt), "20240601050403 +0200");
    }

    #[test]
    fn test_render_structure() {
        let xml = render(&guide());
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<!DOCTYPE tv SYSTEM \"xmltv.dtd\">"));
        assert!(xml.contains("source-info-name=\"TV GO\""));
        assert!(xml.contains("generator-info-name=\"tvgo_export\""));
        assert!(xml.contains("<display-name lang=\"cs\">ČT1 &amp; friends</display-name>"));
        assert!(xml.contains(
            "<programme start=\"20240115200000 +0100\" stop=\"20240115210000 +0100\" channel=\"tm-1-ct1\">"
        ));
        assert!(xml.contains("<title>Zprávy &lt;live&gt;</title>"));
        assert!(xml.contains("<date>2024</date>"));
        assert!(xml.contains("<category>Domácí</category>"));

        assert_eq!(count_elements(&xml, b"channel"), 1);
        assert_eq!(count_elements(&xml, b"programme"), 2);
        assert_eq!(count_elements(&xml, b"category"), 2);
        assert_eq!(count_elements(&xml, b"date"), 1);
        assert_eq!(count_elements(&xml, b"icon"), 2);
    }

    #[test]
    fn test_write_gzip_guide() {
        use flate2::read::GzDecoder;
        use std::io::Read;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("epg.xml.gz");
        let attribution = Attribution::new("TV GO", "https://czgo.magio.tv");
        write_guide(&path, &guide(), &attribution, "cs").unwrap();

        let mut xml = String::new();
        GzDecoder::new(File::open(&path).unwrap())
            .read_to_string(&mut xml)
            .unwrap();
        assert_eq!(count_elements(&xml, b"programme"), 2);
    }

    #[test]
    fn test_write_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("epg.xml");
        let attribution = Attribution::new("TV GO", "https://czgo.magio.tv");
        let err = write_guide(&path, &guide(), &attribution, "cs").unwrap_err();
        assert_eq!(err.path, path);
    }
}
