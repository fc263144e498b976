//! Minimal multi-extension FITS codec.
//!
//! Covers what the reference-frame and table stores need: a primary HDU that
//! carries header cards only, IMAGE extensions and BINTABLE extensions with
//! `D`, `K`, `E`, `J` and `A` columns. Data are big-endian and every header
//! and data unit is padded to a 2880-byte record.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use memmap2::Mmap;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::consts::{FITS_BLOCK_SIZE, FITS_CARD_SIZE};
use crate::error::{EoError, Result};
use crate::table::Column;

/// Cards owned by the codec. They are rebuilt on every write and never
/// copied from a user header.
const STRUCTURAL_KEYS: &[&str] = &[
    "SIMPLE", "XTENSION", "BITPIX", "NAXIS", "NAXIS1", "NAXIS2", "NAXIS3", "EXTEND", "PCOUNT",
    "GCOUNT", "TFIELDS", "BZERO", "BSCALE", "BLANK", "END",
];

fn is_structural(key: &str) -> bool {
    STRUCTURAL_KEYS.contains(&key) || key.starts_with("TTYPE") || key.starts_with("TFORM")
}

/// Value of a single header card.
#[derive(Clone, Debug, PartialEq)]
pub enum CardValue {
    Logical(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl CardValue {
    fn render(&self) -> String {
        match self {
            Self::Logical(b) => format!("{:>20}", if *b { "T" } else { "F" }),
            Self::Int(v) => format!("{v:>20}"),
            Self::Float(v) => format!("{:>20}", render_float(*v)),
            Self::Text(s) => format!("'{:<8}'", s.replace('\'', "''")),
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim_start();
        if let Some(rest) = raw.strip_prefix('\'') {
            let mut out = String::new();
            let mut chars = rest.chars().peekable();
            while let Some(c) = chars.next() {
                if c == '\'' {
                    if chars.peek() == Some(&'\'') {
                        chars.next();
                        out.push('\'');
                    } else {
                        break;
                    }
                } else {
                    out.push(c);
                }
            }
            return Some(Self::Text(out.trim_end().to_string()));
        }
        let token = raw.split('/').next().unwrap_or("").trim();
        match token {
            "" => None,
            "T" => Some(Self::Logical(true)),
            "F" => Some(Self::Logical(false)),
            "NaN" | "inf" | "-inf" => token.parse().ok().map(Self::Float),
            _ if token.contains(&['.', 'E', 'e', 'D'][..]) => {
                token.replace('D', "E").parse().ok().map(Self::Float)
            }
            _ => token.parse().ok().map(Self::Int),
        }
    }
}

fn render_float(v: f64) -> String {
    let text = format!("{v:?}").replace('e', "E");
    if text.contains(&['.', 'E', 'N', 'i'][..]) {
        text
    } else {
        format!("{text}.0")
    }
}

/// Ordered list of header cards. Keys are stored upper-case.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Header {
    cards: Vec<(String, CardValue)>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a card, keeping the position of an existing key.
    pub fn set(&mut self, key: &str, value: CardValue) {
        let key = key.to_ascii_uppercase();
        match self.cards.iter_mut().find(|(k, _)| *k == key) {
            Some(card) => card.1 = value,
            None => self.cards.push((key, value)),
        }
    }

    pub fn set_str(&mut self, key: &str, value: &str) {
        self.set(key, CardValue::Text(value.to_string()));
    }

    pub fn set_int(&mut self, key: &str, value: i64) {
        self.set(key, CardValue::Int(value));
    }

    pub fn set_float(&mut self, key: &str, value: f64) {
        self.set(key, CardValue::Float(value));
    }

    pub fn get(&self, key: &str) -> Option<&CardValue> {
        let key = key.to_ascii_uppercase();
        self.cards.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            CardValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            CardValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric card as `f64`; integer cards are widened.
    pub fn get_float(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            CardValue::Float(v) => Some(*v),
            CardValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<CardValue> {
        let key = key.to_ascii_uppercase();
        let idx = self.cards.iter().position(|(k, _)| *k == key)?;
        Some(self.cards.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CardValue)> {
        self.cards.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Copy of this header without codec-owned structural cards.
    pub fn user_cards(&self) -> Header {
        Header {
            cards: self
                .cards
                .iter()
                .filter(|(k, _)| !is_structural(k))
                .cloned()
                .collect(),
        }
    }

    /// Copy every user card of `other` into `self`, replacing duplicates.
    pub fn merge(&mut self, other: &Header) {
        for (k, v) in other.user_cards().cards {
            self.set(&k, v);
        }
    }
}

/// On-disk pixel encoding of an image extension.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum Bitpix {
    UInt8,
    /// Unsigned 16-bit via `BZERO = 32768`.
    Int16,
    Int32,
    #[default]
    Float32,
    Float64,
}

impl Bitpix {
    pub fn code(self) -> i32 {
        match self {
            Self::UInt8 => 8,
            Self::Int16 => 16,
            Self::Int32 => 32,
            Self::Float32 => -32,
            Self::Float64 => -64,
        }
    }

    fn bytes(self) -> usize {
        (self.code().unsigned_abs() / 8) as usize
    }

    /// Stored value that flags an undefined pixel in integer encodings.
    /// Finite pixels are clamped so they never collide with it.
    pub fn blank(self) -> Option<i64> {
        match self {
            Self::UInt8 => Some(u8::MAX as i64),
            Self::Int16 => Some(i16::MAX as i64),
            Self::Int32 => Some(i32::MIN as i64),
            Self::Float32 | Self::Float64 => None,
        }
    }
}

impl TryFrom<i32> for Bitpix {
    type Error = EoError;

    fn try_from(code: i32) -> Result<Self> {
        match code {
            8 => Ok(Self::UInt8),
            16 => Ok(Self::Int16),
            32 => Ok(Self::Int32),
            -32 => Ok(Self::Float32),
            -64 => Ok(Self::Float64),
            other => Err(EoError::InvalidFits(format!("unsupported BITPIX {other}"))),
        }
    }
}

impl From<Bitpix> for i32 {
    fn from(b: Bitpix) -> i32 {
        b.code()
    }
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Streams HDUs to any writer. The primary HDU must come first; image and
/// table writers insert an empty one when it was not written explicitly.
pub struct FitsWriter<W: Write> {
    out: W,
    hdus_written: usize,
}

impl<W: Write> FitsWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            hdus_written: 0,
        }
    }

    /// Data-less primary HDU carrying `header`'s user cards.
    pub fn write_primary(&mut self, header: &Header) -> Result<()> {
        let mut cards = Header::new();
        cards.set("SIMPLE", CardValue::Logical(true));
        cards.set_int("BITPIX", 8);
        cards.set_int("NAXIS", 0);
        cards.set("EXTEND", CardValue::Logical(true));
        append_user(&mut cards, header);
        self.write_header(&cards)?;
        self.hdus_written += 1;
        Ok(())
    }

    /// IMAGE extension. In integer encodings non-finite pixels are stored
    /// as the `BLANK` value and read back as `NaN`.
    pub fn write_image(&mut self, header: &Header, data: &Array2<f32>, bitpix: Bitpix) -> Result<()> {
        self.ensure_primary()?;
        let (nrows, ncols) = data.dim();
        let mut cards = Header::new();
        cards.set_str("XTENSION", "IMAGE");
        cards.set_int("BITPIX", bitpix.code() as i64);
        cards.set_int("NAXIS", 2);
        cards.set_int("NAXIS1", ncols as i64);
        cards.set_int("NAXIS2", nrows as i64);
        cards.set_int("PCOUNT", 0);
        cards.set_int("GCOUNT", 1);
        if bitpix == Bitpix::Int16 {
            cards.set_float("BZERO", 32768.0);
            cards.set_float("BSCALE", 1.0);
        }
        if let Some(blank) = bitpix.blank() {
            cards.set_int("BLANK", blank);
        }
        append_user(&mut cards, header);
        self.write_header(&cards)?;

        let mut buf = Vec::with_capacity(nrows * ncols * bitpix.bytes());
        for &v in data.iter() {
            let finite = v.is_finite();
            match bitpix {
                Bitpix::UInt8 => buf.push(if finite {
                    v.round().clamp(0.0, (u8::MAX - 1) as f32) as u8
                } else {
                    u8::MAX
                }),
                Bitpix::Int16 => {
                    let stored = if finite {
                        (v.round() - 32768.0).clamp(i16::MIN as f32, (i16::MAX - 1) as f32) as i16
                    } else {
                        i16::MAX
                    };
                    buf.write_i16::<BigEndian>(stored)?;
                }
                Bitpix::Int32 => {
                    let stored = if finite {
                        (v.round() as f64).clamp((i32::MIN + 1) as f64, i32::MAX as f64) as i32
                    } else {
                        i32::MIN
                    };
                    buf.write_i32::<BigEndian>(stored)?;
                }
                Bitpix::Float32 => buf.write_f32::<BigEndian>(v)?,
                Bitpix::Float64 => buf.write_f64::<BigEndian>(v as f64)?,
            }
        }
        self.write_padded(&buf)?;
        self.hdus_written += 1;
        Ok(())
    }

    /// BINTABLE extension with one field per column. All columns must have
    /// the same length; callers validate that before writing.
    pub fn write_table(&mut self, name: &str, columns: &[(String, Column)]) -> Result<()> {
        self.ensure_primary()?;
        let nrows = columns.first().map_or(0, |(_, c)| c.len());
        let forms: Vec<(String, usize)> = columns.iter().map(|(_, c)| tform(c)).collect();
        let row_bytes: usize = forms.iter().map(|(_, w)| w).sum();

        let mut cards = Header::new();
        cards.set_str("XTENSION", "BINTABLE");
        cards.set_int("BITPIX", 8);
        cards.set_int("NAXIS", 2);
        cards.set_int("NAXIS1", row_bytes as i64);
        cards.set_int("NAXIS2", nrows as i64);
        cards.set_int("PCOUNT", 0);
        cards.set_int("GCOUNT", 1);
        cards.set_int("TFIELDS", columns.len() as i64);
        for (i, ((col_name, _), (form, _))) in columns.iter().zip(&forms).enumerate() {
            cards.set_str(&format!("TTYPE{}", i + 1), col_name);
            cards.set_str(&format!("TFORM{}", i + 1), form);
        }
        cards.set_str("EXTNAME", name);
        self.write_header(&cards)?;

        let mut buf = Vec::with_capacity(row_bytes * nrows);
        for row in 0..nrows {
            for ((_, column), (_, width)) in columns.iter().zip(&forms) {
                match column {
                    Column::Float(v) => buf.write_f64::<BigEndian>(v[row])?,
                    Column::Int(v) => buf.write_i64::<BigEndian>(v[row])?,
                    Column::Text(v) => {
                        let bytes = v[row].as_bytes();
                        let n = bytes.len().min(*width);
                        buf.extend_from_slice(&bytes[..n]);
                        buf.resize(buf.len() + width - n, 0);
                    }
                }
            }
        }
        self.write_padded(&buf)?;
        self.hdus_written += 1;
        Ok(())
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.ensure_primary()?;
        self.out.flush()?;
        Ok(self.out)
    }

    fn ensure_primary(&mut self) -> Result<()> {
        if self.hdus_written == 0 {
            self.write_primary(&Header::new())?;
        }
        Ok(())
    }

    fn write_header(&mut self, cards: &Header) -> Result<()> {
        let mut buf = Vec::with_capacity(FITS_BLOCK_SIZE);
        for (key, value) in cards.iter() {
            let card = format!("{:<8}= {}", truncate(key, 8), value.render());
            buf.extend_from_slice(&card_bytes(&card));
        }
        buf.extend_from_slice(format!("{:<80}", "END").as_bytes());
        let padded = buf.len().div_ceil(FITS_BLOCK_SIZE) * FITS_BLOCK_SIZE;
        buf.resize(padded, b' ');
        self.out.write_all(&buf)?;
        Ok(())
    }

    fn write_padded(&mut self, data: &[u8]) -> Result<()> {
        self.out.write_all(data)?;
        let rem = data.len() % FITS_BLOCK_SIZE;
        if rem != 0 {
            self.out.write_all(&vec![0u8; FITS_BLOCK_SIZE - rem])?;
        }
        Ok(())
    }
}

fn append_user(cards: &mut Header, header: &Header) {
    for (key, value) in header.iter() {
        if !is_structural(key) {
            cards.set(key, value.clone());
        }
    }
}

/// One 80-byte card. Header text is ASCII only; anything else becomes `?`.
fn card_bytes(text: &str) -> [u8; FITS_CARD_SIZE] {
    let mut card = [b' '; FITS_CARD_SIZE];
    let ascii = text
        .chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c as u8 } else { b'?' });
    for (slot, byte) in card.iter_mut().zip(ascii) {
        *slot = byte;
    }
    card
}

fn truncate(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn tform(column: &Column) -> (String, usize) {
    match column {
        Column::Float(_) => ("1D".into(), 8),
        Column::Int(_) => ("1K".into(), 8),
        Column::Text(v) => {
            let width = v.iter().map(|s| s.len()).max().unwrap_or(0).max(1);
            (format!("{width}A"), width)
        }
    }
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Kind of a parsed header and data unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HduKind {
    Primary,
    Image,
    Table,
}

#[derive(Clone, Debug)]
struct HduInfo {
    kind: HduKind,
    header: Header,
    bitpix: i32,
    axes: Vec<usize>,
    data_offset: usize,
    data_len: usize,
}

/// Memory-mapped FITS file with its HDU index parsed up front.
pub struct FitsFile {
    mmap: Mmap,
    hdus: Vec<HduInfo>,
}

impl FitsFile {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        if file.metadata()?.len() < FITS_BLOCK_SIZE as u64 {
            return Err(EoError::InvalidFits(format!(
                "{} is smaller than one FITS record",
                path.display()
            )));
        }
        let mmap = unsafe { Mmap::map(&file)? };
        if &mmap[..6] != b"SIMPLE" {
            return Err(EoError::InvalidFits(format!(
                "{} does not start with SIMPLE",
                path.display()
            )));
        }

        let mut hdus = Vec::new();
        let mut offset = 0;
        while offset + FITS_BLOCK_SIZE <= mmap.len() {
            let (info, next) = parse_hdu(&mmap, offset, hdus.is_empty())?;
            hdus.push(info);
            offset = next;
        }
        Ok(Self { mmap, hdus })
    }

    pub fn num_hdus(&self) -> usize {
        self.hdus.len()
    }

    pub fn kind(&self, index: usize) -> Result<HduKind> {
        Ok(self.hdu(index)?.kind)
    }

    /// Full header of HDU `index`, structural cards included.
    pub fn header(&self, index: usize) -> Result<&Header> {
        Ok(&self.hdu(index)?.header)
    }

    /// Index of the first HDU whose `EXTNAME` equals `name`.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.hdus
            .iter()
            .position(|h| h.header.get_str("EXTNAME") == Some(name))
    }

    /// Whether HDU `index` carries a two-dimensional image.
    pub fn has_image(&self, index: usize) -> bool {
        self.hdus
            .get(index)
            .is_some_and(|h| h.kind != HduKind::Table && h.axes.len() == 2 && h.data_len > 0)
    }

    /// Decode an image HDU to `f32`, applying `BSCALE`/`BZERO`.
    pub fn read_image(&self, index: usize) -> Result<Array2<f32>> {
        let info = self.hdu(index)?;
        if !self.has_image(index) {
            return Err(EoError::InvalidFits(format!("HDU {index} has no 2-D image")));
        }
        let bitpix = Bitpix::try_from(info.bitpix)?;
        let (ncols, nrows) = (info.axes[0], info.axes[1]);
        let bzero = info.header.get_float("BZERO").unwrap_or(0.0);
        let bscale = info.header.get_float("BSCALE").unwrap_or(1.0);
        let blank = info.header.get_int("BLANK").filter(|_| bitpix.blank().is_some());
        let raw = &self.mmap[info.data_offset..info.data_offset + info.data_len];
        let step = bitpix.bytes();

        let values: Vec<f32> = raw
            .chunks_exact(step)
            .map(|b| {
                let stored = match bitpix {
                    Bitpix::UInt8 => Some(b[0] as i64),
                    Bitpix::Int16 => Some(BigEndian::read_i16(b) as i64),
                    Bitpix::Int32 => Some(BigEndian::read_i32(b) as i64),
                    Bitpix::Float32 | Bitpix::Float64 => None,
                };
                if stored.is_some() && stored == blank {
                    return f32::NAN;
                }
                let v = match (bitpix, stored) {
                    (_, Some(i)) => i as f64,
                    (Bitpix::Float32, None) => BigEndian::read_f32(b) as f64,
                    (_, None) => BigEndian::read_f64(b),
                };
                (v * bscale + bzero) as f32
            })
            .collect();
        Array2::from_shape_vec((nrows, ncols), values).map_err(|_| EoError::ShapeMismatch {
            expected: (nrows, ncols),
            found: (raw.len() / step / ncols.max(1), ncols),
        })
    }

    /// Decode a BINTABLE HDU into named columns, in field order.
    pub fn read_table(&self, index: usize) -> Result<Vec<(String, Column)>> {
        let info = self.hdu(index)?;
        if info.kind != HduKind::Table {
            return Err(EoError::InvalidFits(format!("HDU {index} is not a BINTABLE")));
        }
        let header = &info.header;
        let (row_bytes, nrows) = match info.axes.as_slice() {
            [row_bytes, nrows] => (*row_bytes, *nrows),
            _ => return Err(EoError::InvalidFits(format!("HDU {index} is not a 2-D table"))),
        };
        let nfields = card_usize(header, "TFIELDS")?.unwrap_or(0);

        let mut fields = Vec::with_capacity(nfields);
        let mut offset: usize = 0;
        for i in 1..=nfields {
            let name = header
                .get_str(&format!("TTYPE{i}"))
                .map_or_else(|| format!("COL{i}"), str::to_string);
            let form = header
                .get_str(&format!("TFORM{i}"))
                .ok_or_else(|| EoError::InvalidFits(format!("missing TFORM{i}")))?;
            let (code, width) = parse_tform(form)?;
            fields.push((name, code, offset, width));
            offset = offset
                .checked_add(width)
                .ok_or_else(|| EoError::InvalidFits("row width overflows".into()))?;
        }
        if offset > row_bytes {
            return Err(EoError::InvalidFits(format!(
                "fields need {offset} bytes per row, NAXIS1 is {row_bytes}"
            )));
        }

        let data = &self.mmap[info.data_offset..info.data_offset + info.data_len];
        if row_bytes.checked_mul(nrows).is_none_or(|n| n > data.len()) {
            return Err(EoError::InvalidFits(format!(
                "table of {nrows} rows of {row_bytes} bytes exceeds its data unit"
            )));
        }
        let mut columns = Vec::with_capacity(nfields);
        for (name, code, field_offset, width) in fields {
            let cells = (0..nrows).map(|r| {
                let start = r * row_bytes + field_offset;
                &data[start..start + width]
            });
            let column = match code {
                'D' => Column::Float(cells.map(BigEndian::read_f64).collect()),
                'E' => Column::Float(cells.map(|b| BigEndian::read_f32(b) as f64).collect()),
                'K' => Column::Int(cells.map(BigEndian::read_i64).collect()),
                'J' => Column::Int(cells.map(|b| BigEndian::read_i32(b) as i64).collect()),
                _ => Column::Text(
                    cells
                        .map(|b| {
                            let end = b.iter().position(|&c| c == 0).unwrap_or(b.len());
                            String::from_utf8_lossy(&b[..end]).into_owned()
                        })
                        .collect(),
                ),
            };
            columns.push((name, column));
        }
        Ok(columns)
    }

    fn hdu(&self, index: usize) -> Result<&HduInfo> {
        self.hdus.get(index).ok_or_else(|| {
            EoError::InvalidFits(format!("HDU {index} out of range ({} HDUs)", self.hdus.len()))
        })
    }
}

fn parse_tform(form: &str) -> Result<(char, usize)> {
    let form = form.trim();
    let split = form
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| EoError::InvalidFits(format!("bad TFORM {form:?}")))?;
    let repeat: usize = if split == 0 {
        1
    } else {
        form[..split]
            .parse()
            .map_err(|_| EoError::InvalidFits(format!("bad TFORM {form:?}")))?
    };
    let code = form[split..].chars().next().unwrap_or('A');
    match (code, repeat) {
        ('D' | 'K', 1) => Ok((code, 8)),
        ('E' | 'J', 1) => Ok((code, 4)),
        ('A', n) => Ok(('A', n)),
        _ => Err(EoError::InvalidFits(format!("unsupported TFORM {form:?}"))),
    }
}

/// Non-negative integer card, or `InvalidFits` when it does not fit a `usize`.
fn card_usize(header: &Header, key: &str) -> Result<Option<usize>> {
    header
        .get_int(key)
        .map(|v| {
            usize::try_from(v).map_err(|_| EoError::InvalidFits(format!("{key} = {v} is out of range")))
        })
        .transpose()
}

fn parse_hdu(bytes: &[u8], start: usize, primary: bool) -> Result<(HduInfo, usize)> {
    let mut header = Header::new();
    let mut pos = start;
    loop {
        if pos + FITS_CARD_SIZE > bytes.len() {
            return Err(EoError::InvalidFits("header has no END card".into()));
        }
        let card = String::from_utf8_lossy(&bytes[pos..pos + FITS_CARD_SIZE]);
        pos += FITS_CARD_SIZE;
        let key = card.get(..8).unwrap_or("").trim_end();
        if key == "END" {
            break;
        }
        if card.get(8..10) == Some("= ") {
            if let Some(value) = card.get(10..).and_then(CardValue::parse) {
                header.set(key, value);
            }
        }
    }
    let data_offset = pos.div_ceil(FITS_BLOCK_SIZE) * FITS_BLOCK_SIZE;

    let bitpix = header
        .get_int("BITPIX")
        .and_then(|v| i32::try_from(v).ok())
        .ok_or_else(|| EoError::InvalidFits("missing or invalid BITPIX".into()))?;
    let naxis = card_usize(&header, "NAXIS")?.unwrap_or(0);
    let axes = (1..=naxis)
        .map(|i| {
            card_usize(&header, &format!("NAXIS{i}"))?
                .ok_or_else(|| EoError::InvalidFits(format!("missing NAXIS{i}")))
        })
        .collect::<Result<Vec<_>>>()?;
    let pcount = card_usize(&header, "PCOUNT")?.unwrap_or(0);
    let gcount = card_usize(&header, "GCOUNT")?.unwrap_or(1);
    let overflow = || EoError::InvalidFits("data unit size overflows".into());
    let data_len = if axes.is_empty() {
        0
    } else {
        let pixels = axes
            .iter()
            .try_fold(1usize, |acc, &n| acc.checked_mul(n))
            .and_then(|n| n.checked_add(pcount))
            .ok_or_else(overflow)?;
        (bitpix.unsigned_abs() as usize / 8)
            .checked_mul(gcount)
            .and_then(|n| n.checked_mul(pixels))
            .ok_or_else(overflow)?
    };
    let data_end = data_offset.checked_add(data_len).ok_or_else(overflow)?;
    if data_end > bytes.len() {
        return Err(EoError::InvalidFits(format!(
            "data unit truncated: need {data_end} bytes, file has {}",
            bytes.len()
        )));
    }

    let kind = if primary {
        HduKind::Primary
    } else if header.get_str("XTENSION") == Some("BINTABLE") {
        HduKind::Table
    } else {
        HduKind::Image
    };
    let next = data_offset + data_len.div_ceil(FITS_BLOCK_SIZE) * FITS_BLOCK_SIZE;
    Ok((
        HduInfo {
            kind,
            header,
            bitpix,
            axes,
            data_offset,
            data_len,
        },
        next,
    ))
}
