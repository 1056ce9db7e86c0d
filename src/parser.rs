// 🧾 Row Parser - DVF text rows → typed RawRow
//
// Published DVF files are pipe-separated, UTF-8, one row per
// (disposition, parcel, local/culture) combination. Columns are resolved by
// header name so extracts with reordered or trimmed columns still load.

use crate::error::ParseError;
use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

// ============================================================================
// COLUMN NAMES
// ============================================================================

pub mod columns {
    pub const DOCUMENT_ID: &str = "Identifiant de document";
    pub const DISPOSITION: &str = "No disposition";
    pub const DATE: &str = "Date mutation";
    pub const NATURE: &str = "Nature mutation";
    pub const PRICE: &str = "Valeur fonciere";
    pub const STREET_NUMBER: &str = "No voie";
    pub const STREET_SUFFIX: &str = "B/T/Q";
    pub const STREET_TYPE: &str = "Type de voie";
    pub const STREET_CODE: &str = "Code voie";
    pub const STREET: &str = "Voie";
    pub const POSTAL_CODE: &str = "Code postal";
    pub const COMMUNE: &str = "Commune";
    pub const DEPARTMENT_CODE: &str = "Code departement";
    pub const COMMUNE_CODE: &str = "Code commune";
    pub const SECTION_PREFIX: &str = "Prefixe de section";
    pub const SECTION: &str = "Section";
    pub const PLAN: &str = "No plan";
    pub const VOLUME: &str = "No Volume";
    pub const LOT_COUNT: &str = "Nombre de lots";
    pub const LOCAL_TYPE_CODE: &str = "Code type local";
    pub const LOCAL_TYPE: &str = "Type local";
    pub const LOCAL_ID: &str = "Identifiant local";
    pub const BUILT_SURFACE: &str = "Surface reelle bati";
    pub const ROOMS: &str = "Nombre pieces principales";
    pub const CULTURE: &str = "Nature culture";
    pub const SPECIAL_CULTURE: &str = "Nature culture speciale";
    pub const LAND_SURFACE: &str = "Surface terrain";

    /// (lot number, Carrez surface) column pairs
    pub const LOTS: [(&str, &str); 5] = [
        ("1er lot", "Surface Carrez du 1er lot"),
        ("2eme lot", "Surface Carrez du 2eme lot"),
        ("3eme lot", "Surface Carrez du 3eme lot"),
        ("4eme lot", "Surface Carrez du 4eme lot"),
        ("5eme lot", "Surface Carrez du 5eme lot"),
    ];

    /// Columns without which no row can be keyed or priced
    pub const REQUIRED: [&str; 8] = [
        DISPOSITION,
        DATE,
        NATURE,
        PRICE,
        DEPARTMENT_CODE,
        COMMUNE_CODE,
        SECTION,
        PLAN,
    ];
}

// ============================================================================
// PRICE
// ============================================================================

/// Euro amount in integer cents, so row-to-row comparison is exact
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Price(i64);

impl Price {
    pub fn from_cents(cents: i64) -> Self {
        Price(cents)
    }

    pub fn cents(&self) -> i64 {
        self.0
    }

    pub fn euros(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Parse "150000,00" / "150000.5" / "150000"
    pub fn parse(text: &str) -> std::result::Result<Self, String> {
        let normalized = text.trim().replace(',', ".");
        if normalized.is_empty() {
            return Err("empty amount".to_string());
        }

        let (whole, fraction) = match normalized.split_once('.') {
            Some((w, f)) => (w, f),
            None => (normalized.as_str(), ""),
        };

        if whole.is_empty() || !whole.chars().all(|c| c.is_ascii_digit()) {
            return Err("not a non-negative decimal number".to_string());
        }
        if !fraction.chars().all(|c| c.is_ascii_digit()) {
            return Err("not a non-negative decimal number".to_string());
        }
        if fraction.len() > 2 {
            return Err("more than two decimal places".to_string());
        }

        let whole: i64 = whole
            .parse()
            .map_err(|_| "amount out of range".to_string())?;
        let fraction: i64 = format!("{:0<2}", fraction)
            .parse()
            .map_err(|_| "not a non-negative decimal number".to_string())?;

        whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(fraction))
            .map(Price)
            .ok_or_else(|| "amount out of range".to_string())
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let cents = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, cents / 100, cents % 100)
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.euros())
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let euros = f64::deserialize(deserializer)?;
        let cents = (euros * 100.0).round();
        // i64::MAX as f64 rounds up to 2^63, which is already out of range
        if !cents.is_finite() || cents < i64::MIN as f64 || cents >= i64::MAX as f64 {
            return Err(de::Error::custom(format!("amount out of range: {}", euros)));
        }
        Ok(Price(cents as i64))
    }
}

// ============================================================================
// ENUMERATED FIELDS
// ============================================================================

/// Nature mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationType {
    Vente,
    VenteFuturAchevement,
    VenteTerrainABatir,
    Echange,
    Adjudication,
    Expropriation,
}

impl MutationType {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "Vente" => Some(MutationType::Vente),
            "Vente en l'état futur d'achèvement" => Some(MutationType::VenteFuturAchevement),
            "Vente terrain à bâtir" => Some(MutationType::VenteTerrainABatir),
            "Echange" | "Échange" => Some(MutationType::Echange),
            "Adjudication" => Some(MutationType::Adjudication),
            "Expropriation" => Some(MutationType::Expropriation),
            _ => None,
        }
    }

    /// Label as published in the DVF files
    pub fn label(&self) -> &'static str {
        match self {
            MutationType::Vente => "Vente",
            MutationType::VenteFuturAchevement => "Vente en l'état futur d'achèvement",
            MutationType::VenteTerrainABatir => "Vente terrain à bâtir",
            MutationType::Echange => "Echange",
            MutationType::Adjudication => "Adjudication",
            MutationType::Expropriation => "Expropriation",
        }
    }
}

/// Type local / Code type local
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocalType {
    Maison,
    Appartement,
    Dependance,
    LocalCommercial,
}

impl LocalType {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "1" => Some(LocalType::Maison),
            "2" => Some(LocalType::Appartement),
            "3" => Some(LocalType::Dependance),
            "4" => Some(LocalType::LocalCommercial),
            _ => None,
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "Maison" => Some(LocalType::Maison),
            "Appartement" => Some(LocalType::Appartement),
            "Dépendance" | "Dependance" => Some(LocalType::Dependance),
            "Local industriel. commercial ou assimilé" => Some(LocalType::LocalCommercial),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            LocalType::Maison => "1",
            LocalType::Appartement => "2",
            LocalType::Dependance => "3",
            LocalType::LocalCommercial => "4",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LocalType::Maison => "Maison",
            LocalType::Appartement => "Appartement",
            LocalType::Dependance => "Dépendance",
            LocalType::LocalCommercial => "Local industriel. commercial ou assimilé",
        }
    }
}

// ============================================================================
// ROW TYPES
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub number: Option<String>,
    pub suffix: Option<String>,
    pub street_type: Option<String>,
    pub street_code: Option<String>,
    pub street: Option<String>,
    pub commune_name: Option<String>,
}

/// Cadastral parcel, compared on its full identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CadastralParcel {
    pub department: String,
    pub commune: String,
    pub prefix: Option<String>,
    pub section: String,
    pub plan: String,
}

impl fmt::Display for CadastralParcel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}{}",
            self.department,
            self.commune,
            self.prefix.as_deref().unwrap_or("000"),
            self.section,
            self.plan
        )
    }
}

/// Co-ownership lot with its Carrez surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lot {
    pub number: String,
    pub carrez_surface_m2: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuiltComponent {
    pub local_type: LocalType,
    pub local_id: Option<String>,
    pub surface_m2: Option<f64>,
    pub rooms: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandComponent {
    pub culture: String,
    pub special_culture: Option<String>,
    pub surface_m2: Option<f64>,
}

/// One parsed DVF line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    pub line: usize,
    pub document_id: Option<String>,
    pub disposition: u32,
    pub date: NaiveDate,
    pub mutation_type: MutationType,
    pub price: Option<Price>,
    pub address: Address,
    pub postal_code: Option<String>,
    pub parcel: CadastralParcel,
    pub volume: Option<String>,
    pub lots: Vec<Lot>,
    pub lot_count: Option<u32>,
    pub built: Option<BuiltComponent>,
    pub land: Option<LandComponent>,
}

impl RawRow {
    pub fn department_code(&self) -> &str {
        &self.parcel.department
    }

    pub fn commune_code(&self) -> &str {
        &self.parcel.commune
    }
}

// ============================================================================
// FIELD PARSERS
// ============================================================================

/// Day/month/year
pub fn parse_date(text: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(text.trim(), "%d/%m/%Y")
        .map_err(|e| format!("expected DD/MM/YYYY: {}", e))
}

/// Blank → None
pub fn parse_price(text: &str) -> std::result::Result<Option<Price>, String> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    Price::parse(text).map(Some)
}

/// Left-pad an all-digit code with zeros; alphanumeric codes (2A, 2B) are kept
pub fn pad_code(text: &str, width: usize) -> String {
    let value = text.trim();
    if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
        format!("{:0>width$}", value, width = width)
    } else {
        value.to_string()
    }
}

/// Sections are two characters in the cadastre ("A" → "0A")
pub fn pad_section(text: &str) -> String {
    format!("{:0>2}", text.trim())
}

fn parse_optional_u32(text: &str) -> std::result::Result<Option<u32>, String> {
    let value = text.trim();
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse::<u32>()
        .map(Some)
        .map_err(|_| "expected a non-negative integer".to_string())
}

fn parse_optional_surface(text: &str) -> std::result::Result<Option<f64>, String> {
    let value = text.trim();
    if value.is_empty() {
        return Ok(None);
    }
    match value.replace(',', ".").parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(Some(v)),
        _ => Err("expected a non-negative surface".to_string()),
    }
}

fn non_empty(text: &str) -> Option<String> {
    let value = text.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

// ============================================================================
// ROW PARSER
// ============================================================================

/// Header-resolved parser for one DVF file
#[derive(Debug, Clone)]
pub struct RowParser {
    columns: HashMap<String, usize>,
}

impl RowParser {
    /// Resolve column positions; fails if a required column is absent
    pub fn from_headers(headers: &StringRecord) -> Result<Self> {
        let positions: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().trim_start_matches('\u{feff}').to_string(), i))
            .collect();

        let missing: Vec<&str> = columns::REQUIRED
            .iter()
            .copied()
            .filter(|c| !positions.contains_key(*c))
            .collect();

        if !missing.is_empty() {
            bail!("Missing required DVF column(s): {}", missing.join(", "));
        }

        Ok(RowParser { columns: positions })
    }

    /// Trimmed value of a column; absent columns read as blank
    fn field<'r>(&self, record: &'r StringRecord, column: &str) -> &'r str {
        self.columns
            .get(column)
            .and_then(|&i| record.get(i))
            .map(str::trim)
            .unwrap_or("")
    }

    pub fn parse_record(
        &self,
        record: &StringRecord,
        line: usize,
    ) -> std::result::Result<RawRow, ParseError> {
        let field = |column: &str| self.field(record, column);
        let fail = |column: &str, reason: String| ParseError::new(line, column, field(column), reason);

        let disposition = match parse_optional_u32(field(columns::DISPOSITION)) {
            Ok(Some(n)) => n,
            Ok(None) => return Err(fail(columns::DISPOSITION, "required".to_string())),
            Err(reason) => return Err(fail(columns::DISPOSITION, reason)),
        };

        if field(columns::DATE).is_empty() {
            return Err(fail(columns::DATE, "required".to_string()));
        }
        let date = parse_date(field(columns::DATE)).map_err(|r| fail(columns::DATE, r))?;

        let mutation_type = MutationType::from_label(field(columns::NATURE))
            .ok_or_else(|| fail(columns::NATURE, "unknown mutation type".to_string()))?;

        let price = parse_price(field(columns::PRICE)).map_err(|r| fail(columns::PRICE, r))?;

        let department = pad_code(field(columns::DEPARTMENT_CODE), 2);
        if department.is_empty() {
            return Err(fail(columns::DEPARTMENT_CODE, "required".to_string()));
        }
        let commune = pad_code(field(columns::COMMUNE_CODE), 3);
        if commune.is_empty() {
            return Err(fail(columns::COMMUNE_CODE, "required".to_string()));
        }

        let parcel = CadastralParcel {
            department,
            commune,
            prefix: non_empty(field(columns::SECTION_PREFIX)).map(|p| pad_code(&p, 3)),
            section: pad_section(field(columns::SECTION)),
            plan: pad_code(field(columns::PLAN), 4),
        };

        let address = Address {
            number: non_empty(field(columns::STREET_NUMBER)),
            suffix: non_empty(field(columns::STREET_SUFFIX)),
            street_type: non_empty(field(columns::STREET_TYPE)),
            street_code: non_empty(field(columns::STREET_CODE)).map(|c| pad_code(&c, 4)),
            street: non_empty(field(columns::STREET)),
            commune_name: non_empty(field(columns::COMMUNE)),
        };

        let mut lots = Vec::new();
        for (number_col, carrez_col) in columns::LOTS {
            if let Some(number) = non_empty(field(number_col)) {
                let carrez_surface_m2 =
                    parse_optional_surface(field(carrez_col)).map_err(|r| fail(carrez_col, r))?;
                lots.push(Lot {
                    number,
                    carrez_surface_m2,
                });
            }
        }

        let lot_count =
            parse_optional_u32(field(columns::LOT_COUNT)).map_err(|r| fail(columns::LOT_COUNT, r))?;

        Ok(RawRow {
            line,
            document_id: non_empty(field(columns::DOCUMENT_ID)),
            disposition,
            date,
            mutation_type,
            price,
            address,
            postal_code: non_empty(field(columns::POSTAL_CODE)).map(|c| pad_code(&c, 5)),
            parcel,
            volume: non_empty(field(columns::VOLUME)),
            lots,
            lot_count,
            built: self.parse_built(record, line)?,
            land: self.parse_land(record, line)?,
        })
    }

    /// Built-property fields; all blank means "not applicable"
    fn parse_built(
        &self,
        record: &StringRecord,
        line: usize,
    ) -> std::result::Result<Option<BuiltComponent>, ParseError> {
        let code = self.field(record, columns::LOCAL_TYPE_CODE);
        let label = self.field(record, columns::LOCAL_TYPE);

        let from_code = if code.is_empty() {
            None
        } else {
            Some(LocalType::from_code(code).ok_or_else(|| {
                ParseError::new(line, columns::LOCAL_TYPE_CODE, code, "unknown local type code")
            })?)
        };
        let from_label = if label.is_empty() {
            None
        } else {
            Some(LocalType::from_label(label).ok_or_else(|| {
                ParseError::new(line, columns::LOCAL_TYPE, label, "unknown local type")
            })?)
        };

        let local_type = match (from_code, from_label) {
            (Some(by_code), Some(by_label)) if by_code != by_label => {
                return Err(ParseError::new(
                    line,
                    columns::LOCAL_TYPE,
                    label,
                    format!("does not match local type code {}", code),
                ));
            }
            (Some(local_type), _) | (None, Some(local_type)) => local_type,
            (None, None) => return Ok(None),
        };

        let surface = self.field(record, columns::BUILT_SURFACE);
        let surface_m2 = parse_optional_surface(surface)
            .map_err(|r| ParseError::new(line, columns::BUILT_SURFACE, surface, r))?;

        let rooms_text = self.field(record, columns::ROOMS);
        let rooms = parse_optional_u32(rooms_text)
            .map_err(|r| ParseError::new(line, columns::ROOMS, rooms_text, r))?;

        Ok(Some(BuiltComponent {
            local_type,
            local_id: non_empty(self.field(record, columns::LOCAL_ID)),
            surface_m2,
            rooms,
        }))
    }

    /// Land fields; a blank culture means "not applicable"
    fn parse_land(
        &self,
        record: &StringRecord,
        line: usize,
    ) -> std::result::Result<Option<LandComponent>, ParseError> {
        let culture = self.field(record, columns::CULTURE);
        if culture.is_empty() {
            return Ok(None);
        }

        let surface = self.field(record, columns::LAND_SURFACE);
        let surface_m2 = parse_optional_surface(surface)
            .map_err(|r| ParseError::new(line, columns::LAND_SURFACE, surface, r))?;

        Ok(Some(LandComponent {
            culture: culture.to_string(),
            special_culture: non_empty(self.field(record, columns::SPECIAL_CULTURE)),
            surface_m2,
        }))
    }
}

// ============================================================================
// FILE READING
// ============================================================================

/// Output of a full parse pass
#[derive(Debug, Clone, Default)]
pub struct ParsedRows {
    pub rows: Vec<RawRow>,
    pub errors: Vec<ParseError>,
    pub rows_read: usize,
}

/// Parse every record of a pipe-separated DVF stream
///
/// Row-level failures are collected in `errors`; only header problems are fatal.
pub fn read_rows<R: Read>(source: R) -> Result<ParsedRows> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'|')
        .has_headers(true)
        .flexible(true)
        .quoting(false)
        .from_reader(source);

    let headers = reader
        .headers()
        .context("Failed to read DVF header row")?
        .clone();
    let parser = RowParser::from_headers(&headers)?;

    let mut parsed = ParsedRows::default();

    for (index, result) in reader.records().enumerate() {
        parsed.rows_read += 1;
        // +2 because: 1-indexed + header row
        let fallback_line = index + 2;

        let record = match result {
            Ok(record) => record,
            Err(e) => {
                let line = e
                    .position()
                    .map(|p| p.line() as usize)
                    .unwrap_or(fallback_line);
                parsed
                    .errors
                    .push(ParseError::new(line, "record", "", e.to_string()));
                continue;
            }
        };

        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(fallback_line);

        match parser.parse_record(&record, line) {
            Ok(row) => parsed.rows.push(row),
            Err(err) => {
                debug!(line, field = %err.field, "rejected row: {}", err.reason);
                parsed.errors.push(err);
            }
        }
    }

    info!(
        rows_read = parsed.rows_read,
        rows_parsed = parsed.rows.len(),
        rejected = parsed.errors.len(),
        "parsed DVF rows"
    );

    Ok(parsed)
}

/// Open a DVF text file and parse it
pub fn load_rows(path: &Path) -> Result<ParsedRows> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open DVF file: {}", path.display()))?;
    read_rows(file).with_context(|| format!("Failed to parse DVF file: {}", path.display()))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub const HEADER: &str = "Identifiant de document|No disposition|Date mutation|Nature mutation|Valeur fonciere|No voie|B/T/Q|Type de voie|Code voie|Voie|Code postal|Commune|Code departement|Code commune|Prefixe de section|Section|No plan|No Volume|1er lot|Surface Carrez du 1er lot|Nombre de lots|Code type local|Type local|Identifiant local|Surface reelle bati|Nombre pieces principales|Nature culture|Nature culture speciale|Surface terrain";

    /// Build a DVF line with the commonly varied fields; the rest is fixed
    pub fn dvf_line(
        doc: &str,
        disposition: &str,
        price: &str,
        plan: &str,
        local_type: &str,
        culture: &str,
    ) -> String {
        let (code, surface, rooms) = match local_type {
            "Maison" => ("1", "95", "4"),
            "Appartement" => ("2", "48", "2"),
            "Dépendance" => ("3", "", "0"),
            _ => ("", "", ""),
        };
        let land_surface = if culture.is_empty() { "" } else { "312" };
        format!(
            "{doc}|{disposition}|05/01/2023|Vente|{price}|12||RUE|0450|DES LILAS|1000|BOURG-EN-BRESSE|1|53||AB|{plan}||||1|{code}|{local_type}||{surface}|{rooms}|{culture}||{land_surface}"
        )
    }

    pub fn dvf_text(lines: &[String]) -> String {
        let mut text = String::from(HEADER);
        for line in lines {
            text.push('\n');
            text.push_str(line);
        }
        text.push('\n');
        text
    }

    #[test]
    fn test_price_parse_comma_decimal() {
        assert_eq!(Price::parse("1000,00").unwrap(), Price::from_cents(100_000));
        assert_eq!(Price::parse("1000,5").unwrap(), Price::from_cents(100_050));
        assert_eq!(Price::parse("250000").unwrap(), Price::from_cents(25_000_000));
        assert_eq!(Price::parse("12.34").unwrap().to_string(), "12.34");
    }

    #[test]
    fn test_price_parse_rejects_garbage() {
        assert!(Price::parse("").is_err());
        assert!(Price::parse("12a,00").is_err());
        assert!(Price::parse("-5,00").is_err());
        assert!(Price::parse("1,234").is_err());
        assert!(Price::parse("1,2,3").is_err());
    }

    #[test]
    fn test_price_serializes_as_euros() {
        let json = serde_json::to_string(&Price::from_cents(100_000)).unwrap();
        assert_eq!(json, "1000.0");

        let back: Price = serde_json::from_str("1234.56").unwrap();
        assert_eq!(back, Price::from_cents(123_456));
    }

    #[test]
    fn test_negative_price_display() {
        assert_eq!(Price::from_cents(-5).to_string(), "-0.05");
        assert_eq!(Price::from_cents(-12_345).to_string(), "-123.45");
        assert_eq!(Price::from_cents(7).to_string(), "0.07");
    }

    #[test]
    fn test_price_deserialize_rejects_out_of_range() {
        assert!(serde_json::from_str::<Price>("1e300").is_err());
        assert!(serde_json::from_str::<Price>("-1e300").is_err());
        assert_eq!(
            serde_json::from_str::<Price>("-0.05").unwrap(),
            Price::from_cents(-5)
        );
    }

    #[test]
    fn test_parse_date_day_month_year() {
        let date = parse_date("05/01/2023").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2023, 1, 5).unwrap());
        assert!(parse_date("2023-01-05").is_err());
        assert!(parse_date("31/02/2023").is_err());
    }

    #[test]
    fn test_codes_keep_leading_zeros() {
        assert_eq!(pad_code("1", 2), "01");
        assert_eq!(pad_code("2A", 2), "2A");
        assert_eq!(pad_code("971", 2), "971");
        assert_eq!(pad_code("53", 3), "053");
        assert_eq!(pad_code("1000", 5), "01000");
        assert_eq!(pad_section("A"), "0A");
        assert_eq!(pad_section("AB"), "AB");
    }

    #[test]
    fn test_mutation_and_local_labels() {
        assert_eq!(MutationType::from_label("Vente"), Some(MutationType::Vente));
        assert_eq!(
            MutationType::from_label("Vente en l'état futur d'achèvement"),
            Some(MutationType::VenteFuturAchevement)
        );
        assert_eq!(MutationType::from_label("Donation"), None);
        assert_eq!(LocalType::from_code("2"), Some(LocalType::Appartement));
        assert_eq!(LocalType::from_label("Maison"), Some(LocalType::Maison));
        assert_eq!(LocalType::Dependance.code(), "3");
    }

    #[test]
    fn test_read_rows_typed_fields() {
        let text = dvf_text(&[dvf_line("D1", "1", "185000,00", "12", "Maison", "S")]);
        let parsed = read_rows(text.as_bytes()).unwrap();

        assert_eq!(parsed.rows_read, 1);
        assert!(parsed.errors.is_empty());
        let row = &parsed.rows[0];

        assert_eq!(row.line, 2);
        assert_eq!(row.document_id.as_deref(), Some("D1"));
        assert_eq!(row.disposition, 1);
        assert_eq!(row.price, Some(Price::from_cents(18_500_000)));
        assert_eq!(row.postal_code.as_deref(), Some("01000"));
        assert_eq!(row.department_code(), "01");
        assert_eq!(row.commune_code(), "053");
        assert_eq!(row.parcel.section, "AB");
        assert_eq!(row.parcel.plan, "0012");
        assert_eq!(row.address.street.as_deref(), Some("DES LILAS"));
        assert_eq!(row.lot_count, Some(1));

        let built = row.built.as_ref().unwrap();
        assert_eq!(built.local_type, LocalType::Maison);
        assert_eq!(built.surface_m2, Some(95.0));
        assert_eq!(built.rooms, Some(4));

        let land = row.land.as_ref().unwrap();
        assert_eq!(land.culture, "S");
        assert_eq!(land.surface_m2, Some(312.0));
    }

    #[test]
    fn test_blank_built_and_land_fields_are_not_applicable() {
        let text = dvf_text(&[dvf_line("D1", "1", "1000,00", "12", "", "")]);
        let parsed = read_rows(text.as_bytes()).unwrap();

        assert!(parsed.errors.is_empty());
        assert!(parsed.rows[0].built.is_none());
        assert!(parsed.rows[0].land.is_none());
    }

    #[test]
    fn test_blank_price_is_none() {
        let text = dvf_text(&[dvf_line("D1", "1", "", "12", "Maison", "")]);
        let parsed = read_rows(text.as_bytes()).unwrap();

        assert!(parsed.errors.is_empty());
        assert_eq!(parsed.rows[0].price, None);
    }

    #[test]
    fn test_bad_row_is_collected_not_fatal() {
        let text = dvf_text(&[
            dvf_line("D1", "1", "1000,00", "12", "Maison", ""),
            dvf_line("D2", "1", "12x,00", "13", "Maison", ""),
            dvf_line("D3", "abc", "1000,00", "14", "Maison", ""),
        ]);
        let parsed = read_rows(text.as_bytes()).unwrap();

        assert_eq!(parsed.rows_read, 3);
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.errors.len(), 2);

        assert_eq!(parsed.errors[0].line, 3);
        assert_eq!(parsed.errors[0].field, columns::PRICE);
        assert_eq!(parsed.errors[1].line, 4);
        assert_eq!(parsed.errors[1].field, columns::DISPOSITION);
    }

    #[test]
    fn test_unknown_mutation_type_names_field() {
        let line = dvf_line("D1", "1", "1000,00", "12", "Maison", "").replace("|Vente|", "|Donation|");
        let parsed = read_rows(dvf_text(&[line]).as_bytes()).unwrap();

        assert_eq!(parsed.errors.len(), 1);
        assert_eq!(parsed.errors[0].field, columns::NATURE);
        assert_eq!(parsed.errors[0].value, "Donation");
    }

    #[test]
    fn test_local_type_code_and_label_must_agree() {
        let line = dvf_line("D1", "1", "1000,00", "12", "Maison", "").replace("|1|Maison|", "|1|Appartement|");
        let parsed = read_rows(dvf_text(&[line]).as_bytes()).unwrap();

        assert!(parsed.rows.is_empty());
        assert_eq!(parsed.errors.len(), 1);
        assert_eq!(parsed.errors[0].field, columns::LOCAL_TYPE);
        assert_eq!(parsed.errors[0].value, "Appartement");
    }

    #[test]
    fn test_local_type_from_code_alone() {
        let line = dvf_line("D1", "1", "1000,00", "12", "Maison", "").replace("|1|Maison|", "|1||");
        let parsed = read_rows(dvf_text(&[line]).as_bytes()).unwrap();

        assert!(parsed.errors.is_empty());
        assert_eq!(parsed.rows[0].built.as_ref().unwrap().local_type, LocalType::Maison);
    }

    #[test]
    fn test_missing_required_column_is_fatal() {
        let text = "No disposition|Date mutation\n1|05/01/2023\n";
        let result = read_rows(text.as_bytes());

        assert!(result.is_err());
        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("Valeur fonciere"));
    }

    #[test]
    fn test_columns_resolved_by_name() {
        let text = "Section|No plan|Code commune|Code departement|Valeur fonciere|Nature mutation|Date mutation|No disposition|Type local\nA|7|1|75|50000,00|Vente|01/02/2023|2|Appartement\n";
        let parsed = read_rows(text.as_bytes()).unwrap();

        assert!(parsed.errors.is_empty());
        let row = &parsed.rows[0];
        assert_eq!(row.disposition, 2);
        assert_eq!(row.parcel.section, "0A");
        assert_eq!(row.parcel.plan, "0007");
        assert_eq!(row.commune_code(), "001");
        assert_eq!(row.built.as_ref().unwrap().local_type, LocalType::Appartement);
        assert!(row.document_id.is_none());
    }
}
