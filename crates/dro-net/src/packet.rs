//! Delimiter-based packet codec.
//!
//! Every packet on the wire is a header followed by its fields, all joined by
//! the field delimiter and closed by the unit terminator:
//!
//! ```text
//! HEADER#field1#field2#...#fieldN#%
//! ```
//!
//! Fields are UTF-8 text and may be empty; empty fields are significant and
//! survive a decode. There is no escaping: a payload containing `#` or `#%`
//! will not decode back to the same packet.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Separates the header and the fields of one unit.
pub const FIELD_DELIMITER: &str = "#";

/// Marks the end of one unit on the wire.
pub const UNIT_TERMINATOR: &str = "#%";

/// Separates the items of a sub-list stored inside a single field.
pub const SUB_FIELD_DELIMITER: &str = "&";

/// A protocol unit: a header plus an ordered list of fields.
///
/// The packet carries no schema; what a header means and how its fields are
/// interpreted belongs to the application layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Packet {
    /// First segment of the unit.
    pub header: String,
    /// Remaining segments, in wire order.
    pub fields: Vec<String>,
}

impl Packet {
    /// Create a packet from a header and its fields.
    pub fn new<H, I, F>(header: H, fields: I) -> Self
    where
        H: Into<String>,
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        Self {
            header: header.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Create a packet with no fields.
    pub fn with_header(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field.
    pub fn push_field(&mut self, field: impl Into<String>) {
        self.fields.push(field.into());
    }

    /// Builder form of [`Packet::push_field`].
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.push_field(field);
        self
    }

    /// Append one field holding `items` joined by [`SUB_FIELD_DELIMITER`].
    pub fn push_list<I>(&mut self, items: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut field = String::new();
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 {
                field.push_str(SUB_FIELD_DELIMITER);
            }
            field.push_str(item.as_ref());
        }
        self.fields.push(field);
    }

    /// Return the field at `index`.
    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

    /// Split the field at `index` into its sub-list items, keeping empty items.
    pub fn field_list(&self, index: usize) -> Option<Vec<&str>> {
        self.fields
            .get(index)
            .map(|field| field.split(SUB_FIELD_DELIMITER).collect())
    }

    /// Serialize to the wire form, terminator included.
    pub fn encode(&self) -> String {
        let capacity = self.header.len()
            + self.fields.iter().map(|f| f.len() + 1).sum::<usize>()
            + UNIT_TERMINATOR.len();
        let mut wire = String::with_capacity(capacity);
        self.write_body(&mut wire);
        wire.push_str(UNIT_TERMINATOR);
        wire
    }

    /// Parse one raw unit (terminator already stripped).
    ///
    /// Never fails: the first segment becomes the header and every further
    /// segment becomes a field, empty segments included. An empty unit
    /// yields an empty header and no fields.
    pub fn decode(raw_unit: &str) -> Self {
        let mut segments = raw_unit.split(FIELD_DELIMITER);
        let header = segments.next().unwrap_or_default().to_owned();
        let fields = segments.map(str::to_owned).collect();
        Self { header, fields }
    }

    fn write_body(&self, out: &mut String) {
        out.push_str(&self.header);
        for field in &self.fields {
            out.push_str(FIELD_DELIMITER);
            out.push_str(field);
        }
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut body = String::new();
        self.write_body(&mut body);
        f.write_str(&body)
    }
}

/// Parses a hand-typed line such as `CT#name#hello`. A trailing terminator is
/// optional.
impl FromStr for Packet {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim_end_matches(['\r', '\n']);
        let unit = line.strip_suffix(UNIT_TERMINATOR).unwrap_or(line);
        Ok(Self::decode(unit))
    }
}
