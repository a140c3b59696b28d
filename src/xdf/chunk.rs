//! Chunk tags and XML content builders (spec.md §4.3.2).

use crate::model::{MetadataNode, StreamDescriptor};
use quick_xml::escape::escape;
use uuid::Uuid;

pub const TAG_FILE_HEADER: u16 = 1;
pub const TAG_STREAM_HEADER: u16 = 2;
pub const TAG_SAMPLES: u16 = 3;
pub const TAG_CLOCK_OFFSET: u16 = 4;
pub const TAG_BOUNDARY: u16 = 5;
pub const TAG_STREAM_FOOTER: u16 = 6;

/// Bytes of the fixed UUID every Boundary chunk carries as its content.
const BOUNDARY_UUID_BYTES: [u8; 16] = [
    0x43, 0xA5, 0x46, 0xDC, 0xCB, 0xF5, 0x41, 0x0F, 0xB3, 0x0E, 0xD5, 0x46, 0x73, 0x83, 0xCB, 0xE4,
];

/// 16-byte fixed UUID content of a Boundary chunk (spec.md §4.3.4).
pub fn boundary_uuid() -> Uuid {
    Uuid::from_bytes(BOUNDARY_UUID_BYTES)
}

/// `<?xml …?><info><version>1.0</version></info>`
pub fn file_header_xml() -> String {
    "<?xml version=\"1.0\"?><info><version>1.0</version></info>".to_string()
}

fn render_metadata(node: &MetadataNode) -> String {
    let mut out = String::new();
    for child in &node.children {
        render_node(child, &mut out);
    }
    if let Some(text) = &node.text {
        out.push_str(&escape(text));
    }
    out
}

fn render_node(node: &MetadataNode, out: &mut String) {
    out.push('<');
    out.push_str(&node.name);
    out.push('>');
    if let Some(text) = &node.text {
        out.push_str(&escape(text));
    }
    for child in &node.children {
        render_node(child, out);
    }
    out.push_str("</");
    out.push_str(&node.name);
    out.push('>');
}

/// StreamHeader XML body (the part after the `stream_id:u32` prefix).
pub fn stream_header_xml(descriptor: &StreamDescriptor) -> String {
    format!(
        "<?xml version=\"1.0\"?><info><name>{name}</name><type>{ty}</type>\
         <channel_count>{cc}</channel_count><nominal_srate>{sr}</nominal_srate>\
         <channel_format>{fmt}</channel_format><source_id>{sid}</source_id>\
         <hostname>{host}</hostname><desc>{desc}</desc></info>",
        name = escape(&descriptor.name),
        ty = escape(&descriptor.r#type),
        cc = descriptor.channel_count,
        sr = descriptor.nominal_srate,
        fmt = descriptor.channel_format,
        sid = escape(&descriptor.source_id),
        host = escape(&descriptor.hostname),
        desc = render_metadata(&descriptor.metadata),
    )
}

/// StreamFooter XML body (the part after the `stream_id:u32` prefix).
pub fn stream_footer_xml(
    first_timestamp: f64,
    last_timestamp: f64,
    sample_count: u64,
    clock_offsets: u64,
) -> String {
    format!(
        "<?xml version=\"1.0\"?><info><first_timestamp>{first}</first_timestamp>\
         <last_timestamp>{last}</last_timestamp><sample_count>{count}</sample_count>\
         <clock_offsets>{offsets}</clock_offsets></info>",
        first = first_timestamp,
        last = last_timestamp,
        count = sample_count,
        offsets = clock_offsets,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChannelFormat;

    #[test]
    fn file_header_is_well_formed_xml_text() {
        let xml = file_header_xml();
        assert!(xml.contains("<version>1.0</version>"));
    }

    #[test]
    fn boundary_uuid_matches_spec_bytes() {
        assert_eq!(
            boundary_uuid().as_bytes(),
            &[0x43, 0xA5, 0x46, 0xDC, 0xCB, 0xF5, 0x41, 0x0F, 0xB3, 0x0E, 0xD5, 0x46, 0x73, 0x83, 0xCB, 0xE4]
        );
    }

    #[test]
    fn stream_header_escapes_name() {
        let mut d = StreamDescriptor {
            uid: "u".into(),
            name: "a & b".into(),
            r#type: "EEG".into(),
            hostname: "h".into(),
            source_id: "s".into(),
            channel_count: 2,
            channel_format: ChannelFormat::Float32,
            nominal_srate: 250.0,
            metadata: MetadataNode::default(),
        };
        d.metadata = MetadataNode::branch(
            "channels",
            vec![MetadataNode::leaf("label", "Cz")],
        );
        let xml = stream_header_xml(&d);
        assert!(xml.contains("a &amp; b"));
        assert!(xml.contains("<label>Cz</label>"));
    }
}
