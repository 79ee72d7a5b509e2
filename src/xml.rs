//
// xml.rs
// Dicom-Harmonize
//
// XML form of the protocol descriptor, written and read back with quick-xml.
//
// Thales Matheus Mendonça Santos - November 2025

use std::io::Cursor;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{ProcessingError, Result};
use crate::protocol::{ParameterValue, ProtocolDescriptor, ProtocolParameter, ValidRange};

const ROOT: &str = "Protocol";
const PARAMETER: &str = "Parameter";

/// Layout:
///
/// ```xml
/// <Protocol>
///   <Parameter name="EchoTime">
///     <value type="number">12</value>
///     <unit>ms</unit>
///     <valid_range><min>0</min><max>500</max></valid_range>
///   </Parameter>
/// </Protocol>
/// ```
///
/// Parameter names live in an attribute because private tag keys such as
/// `(0019,109C)` are not valid element names.
pub fn to_xml_string(descriptor: &ProtocolDescriptor) -> Result<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new(ROOT)))?;

    for (name, parameter) in descriptor.iter() {
        writer.write_event(Event::Start(
            BytesStart::new(PARAMETER).with_attributes([("name", name)]),
        ))?;

        let (kind, text) = match &parameter.value {
            ParameterValue::Number(v) => ("number", v.to_string()),
            ParameterValue::Text(s) => ("text", s.clone()),
        };
        writer.write_event(Event::Start(
            BytesStart::new("value").with_attributes([("type", kind)]),
        ))?;
        writer.write_event(Event::Text(BytesText::new(&text)))?;
        writer.write_event(Event::End(BytesEnd::new("value")))?;

        if let Some(unit) = &parameter.unit {
            write_text_element(&mut writer, "unit", unit)?;
        }

        match &parameter.valid_range {
            Some(ValidRange::Interval(min, max)) => {
                writer.write_event(Event::Start(BytesStart::new("valid_range")))?;
                write_text_element(&mut writer, "min", &min.to_string())?;
                write_text_element(&mut writer, "max", &max.to_string())?;
                writer.write_event(Event::End(BytesEnd::new("valid_range")))?;
            }
            Some(ValidRange::Options(options)) => {
                writer.write_event(Event::Start(
                    BytesStart::new("valid_range").with_attributes([("kind", "options")]),
                ))?;
                for option in options {
                    write_text_element(&mut writer, "option", option)?;
                }
                writer.write_event(Event::End(BytesEnd::new("valid_range")))?;
            }
            None => {}
        }

        writer.write_event(Event::End(BytesEnd::new(PARAMETER)))?;
    }

    writer.write_event(Event::End(BytesEnd::new(ROOT)))?;

    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).map_err(|e| ProcessingError::MalformedProtocol(e.to_string()))
}

fn write_text_element(writer: &mut Writer<Cursor<Vec<u8>>>, tag: &str, text: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

/// Partially read `<Parameter>` while walking the event stream.
#[derive(Default)]
struct PendingParameter {
    name: String,
    value: Option<ParameterValue>,
    value_is_number: bool,
    unit: Option<String>,
    range_min: Option<f64>,
    range_max: Option<f64>,
    options: Option<Vec<String>>,
}

impl PendingParameter {
    fn finish(self) -> Result<(String, ProtocolParameter)> {
        let value = match self.value {
            Some(value) => value,
            // A parameter without a <value> element reads as empty text.
            None if !self.value_is_number => ParameterValue::Text(String::new()),
            None => {
                return Err(ProcessingError::MalformedProtocol(format!(
                    "parameter {} has no value",
                    self.name
                )))
            }
        };
        let valid_range = match (self.range_min, self.range_max, self.options) {
            (Some(min), Some(max), _) => Some(ValidRange::Interval(min, max)),
            (None, None, Some(options)) => Some(ValidRange::Options(options)),
            (None, None, None) => None,
            _ => {
                return Err(ProcessingError::MalformedProtocol(format!(
                    "parameter {} has an incomplete valid_range",
                    self.name
                )))
            }
        };
        Ok((
            self.name,
            ProtocolParameter {
                value,
                unit: self.unit,
                valid_range,
            },
        ))
    }
}

pub fn from_xml_str(document: &str) -> Result<ProtocolDescriptor> {
    // Whitespace is kept: leaf text is written unindented and may carry
    // meaningful leading or trailing spaces.
    let mut reader = Reader::from_str(document);

    let mut descriptor = ProtocolDescriptor::new();
    let mut pending: Option<PendingParameter> = None;
    let mut current_tag = String::new();
    let mut text_seen = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                current_tag = open_element(&e, &mut pending)?;
                text_seen = false;
            }
            Event::Empty(e) => {
                let tag = open_element(&e, &mut pending)?;
                if tag == PARAMETER {
                    close_parameter(&mut pending, &mut descriptor)?;
                } else if let Some(p) = pending.as_mut() {
                    apply_text(p, &tag, String::new())?;
                }
                current_tag.clear();
            }
            Event::Text(e) => {
                let text = e.unescape()?.to_string();
                if let Some(p) = pending.as_mut() {
                    apply_text(p, &current_tag, text)?;
                }
                text_seen = true;
            }
            Event::End(e) => {
                if e.name().as_ref() == PARAMETER.as_bytes() {
                    close_parameter(&mut pending, &mut descriptor)?;
                } else if !text_seen && !current_tag.is_empty() {
                    // <unit></unit> produces no Text event.
                    if let Some(p) = pending.as_mut() {
                        apply_text(p, &current_tag, String::new())?;
                    }
                }
                current_tag.clear();
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(descriptor)
}

/// Records what a start (or empty) element contributes and returns its name.
fn open_element(e: &BytesStart<'_>, pending: &mut Option<PendingParameter>) -> Result<String> {
    let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
    match tag.as_str() {
        PARAMETER => {
            let name = e
                .try_get_attribute("name")?
                .ok_or_else(|| {
                    ProcessingError::MalformedProtocol("Parameter element without a name".into())
                })?
                .unescape_value()?
                .to_string();
            *pending = Some(PendingParameter {
                name,
                ..PendingParameter::default()
            });
        }
        "value" => {
            let kind = match e.try_get_attribute("type")? {
                Some(attr) => attr.unescape_value()?.to_string(),
                None => "text".to_string(),
            };
            if let Some(p) = pending.as_mut() {
                p.value_is_number = kind == "number";
            }
        }
        "valid_range" => {
            let is_options = e.try_get_attribute("kind")?.is_some();
            if let (Some(p), true) = (pending.as_mut(), is_options) {
                p.options = Some(Vec::new());
            }
        }
        _ => {}
    }
    Ok(tag)
}

fn close_parameter(
    pending: &mut Option<PendingParameter>,
    descriptor: &mut ProtocolDescriptor,
) -> Result<()> {
    if let Some(p) = pending.take() {
        let (name, parameter) = p.finish()?;
        descriptor.insert(name, parameter);
    }
    Ok(())
}

fn apply_text(p: &mut PendingParameter, tag: &str, text: String) -> Result<()> {
    let name = p.name.clone();
    let number = |text: &str| {
        text.parse::<f64>().map_err(|_| {
            ProcessingError::MalformedProtocol(format!("{tag} of {name} is not a number: {text}"))
        })
    };
    match tag {
        "value" if p.value_is_number => p.value = Some(ParameterValue::Number(number(&text)?)),
        "value" => p.value = Some(ParameterValue::Text(text)),
        "unit" => p.unit = Some(text),
        "min" => p.range_min = Some(number(&text)?),
        "max" => p.range_max = Some(number(&text)?),
        "option" => p.options.get_or_insert_with(Vec::new).push(text),
        _ => {}
    }
    Ok(())
}
