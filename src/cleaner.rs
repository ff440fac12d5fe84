//! Metadata cleaner: rewrites recording/artist names into a more canonical
//! form so the fuzzy index gets a second chance at a match.
//!
//! Used exclusively by the Resolver's cleaning-retry loop (see `resolver.rs`).
//! The title patterns strip remaster/live/deluxe/mix/explicit/demo/year-suffix
//! and similar noise that tagging tools commonly leave in free-text fields;
//! the artist patterns strip featured-artist lists and band-type suffixes,
//! and the transliteration table covers non-Latin artist names that
//! `any_ascii` alone does not map the way MusicBrainz spells them.

use any_ascii::any_ascii;
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashMap;
use unicode_normalization::UnicodeNormalization;

// ============================================================================
// REGEX PATTERNS
// ============================================================================

static TITLE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)\s*[-–—/]\s*(?:remaster(?:ed)?(?:\s+\d{4})?|(?:\d{4}\s+)?remaster(?:ed)?)").unwrap(),
        Regex::new(r"(?i)\s*[\(\[](?:remaster(?:ed)?(?:\s+\d{4})?|(?:\d{4}\s+)?remaster(?:ed)?)[\)\]]").unwrap(),
        Regex::new(r"(?i)\s*[\(\[](?:live(?:\s+(?:at|from|in)\s+[^)\]]+)?|acoustic(?:\s+version)?|unplugged)[\)\]]").unwrap(),
        Regex::new(r"(?i)\s*[-–—]\s*(?:live(?:\s+(?:at|from|in)\s+.+)?|acoustic(?:\s+version)?)").unwrap(),
        Regex::new(r"(?i)\s*[\(\[](?:deluxe|super\s+deluxe|expanded|anniversary|bonus\s+track(?:s)?|special|collector'?s?)(?:\s+edition)?[\)\]]").unwrap(),
        Regex::new(r"(?i)\s*[\(\[](?:radio\s+edit|single\s+version|album\s+version|extended(?:\s+(?:mix|version))?|original\s+mix|mono|stereo)[\)\]]").unwrap(),
        Regex::new(r"(?i)\s*[\(\[](?:explicit|clean|censored|instrumental|karaoke)[\)\]]").unwrap(),
        Regex::new(r"(?i)\s*[\(\[](?:demo(?:\s+version)?|alternate(?:\s+(?:take|version))?|outtake|take\s*\d+)[\)\]]").unwrap(),
        Regex::new(r"(?i)\s*[-–—]\s*\d{4}(?:\s+(?:version|mix|edit))?$").unwrap(),
        Regex::new(r"(?i)\s*[\(\[](?:feat\.?|ft\.?|featuring)\s+[^)\]]+[\)\]]").unwrap(),
        Regex::new(r"(?i)\s*[\(\[](?:sped\s+up|slowed(?:\s*\+\s*reverb)?|nightcore|daycore)[\)\]]").unwrap(),
        Regex::new(r"(?i)\s*[\(\[](?:reworked?|redux|re-?recorded|reimagined)[\)\]]").unwrap(),
        Regex::new(r"(?i)\s*[\(\[](?:v(?:ersion)?\s*)?\d[\)\]]").unwrap(),
        Regex::new(r"(?i)\s*[-–—]\s*(?:mono|stereo)(?:\s*/\s*\d{4}\s*remaster(?:ed)?)?").unwrap(),
        Regex::new(r"(?i)\s+(?:feat\.?|ft\.?|featuring)\s+.+$").unwrap(),
        Regex::new(r"(?i)\s*[-–—_]?\s*[a-z0-9]+\.(?:com|net|org|io|ru|de|fr|es|co\.uk)").unwrap(),
        Regex::new(r"(?i)\s*[\(\[](?:visuali[sz]er|lyric\s*video|official\s*video|audio|comentario|commentary)[\)\]]").unwrap(),
        Regex::new(r"(?i)\s*[-–—]\s*\d{4}\s+digital\s+remaster(?:ed)?\s*$").unwrap(),
        Regex::new(r"(?i)\s*[\(\[](?:disc|cd)\s*\d+[\)\]]").unwrap(),
        Regex::new(r#"(?i)\s*[-–—]\s*(?:single|lp|7["']?|12["']?)\s+version\s*$"#).unwrap(),
        Regex::new(r"(?i)\s*[\(\[](?:bonus(?:\s+track)?|hidden\s+track)[\)\]]").unwrap(),
        Regex::new(r"(?i)\s*[\(\[]from\s+[^)\]]+[\)\]]").unwrap(),
        Regex::new(r"(?i)\s*[\(\[](?:uk|us|usa|original)\s+(?:mix|version|edit)[\)\]]").unwrap(),
        Regex::new(r"(?i)\s*[-–—]\s*[a-z0-9\s]+\s+(?:remix|mix|edit)\s*$").unwrap(),
        Regex::new(r"(?i)\s*[\(\[](?:[a-z]+\s+)?(?:session|sessions|take\s*\d+)[\)\]]").unwrap(),
        Regex::new(r"(?i)\s*[\(\[](?:live|concert|tour)(?:\s+\d{4})?[\)\]]").unwrap(),
        Regex::new(r"(?i)\s*[\(\[]prod\.?\s+(?:by\s+)?[^)\]]+[\)\]]").unwrap(),
        Regex::new(r"(?i)\s*[\(\[](?:copyright\s+free|no\s+copyright|royalty\s+free)[\)\]]").unwrap(),
        Regex::new(r"(?i)\s*[\(\[](?:official\s+)?music\s+video(?:\s+\d{4})?[\)\]]").unwrap(),
    ]
});

static TRACK_NUMBER_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:track\s*)?\d{1,4}\s*[-–—._]\s*").unwrap());
static TRACK_NUMBER_SPACE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:0[1-9]|[1-9]\d?)\s+([A-Z])").unwrap());
static TRACK_NUMBER_BRACKET: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[\d{1,2}\]\s*").unwrap());
static TRACK_ARTIST_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,3}\.\s*[^-–—]+\s*[-–—]\s*").unwrap());
static MOJIBAKE_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\u{FFFD}]+$").unwrap());
static BRACKET_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\[[^\]]+\]\s*$").unwrap());
static FILE_EXTENSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.(flac|mp3|wav|m4a|ogg|aac)$").unwrap());
static YEAR_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\(\d{4}\)\s*$").unwrap());

static ARTIST_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)\s+(?:feat\.?|ft\.?|featuring|with|&|,|;|/)\s+.*").unwrap(),
        Regex::new(r"(?i)\s+(?:band|orchestra|ensemble|quartet|trio)$").unwrap(),
    ]
});

static ARTIST_SEPARATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*(?:[&/,•+×]|(?:\s+(?:x|vs\.?|and|with|feat\.?|ft\.?)\s+))\s*").unwrap()
});

static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());

/// Non-Latin artist name to Latin spelling overrides, for scripts where
/// `any_ascii`'s naive transliteration doesn't land on the spelling
/// MusicBrainz/users actually use.
static ARTIST_TRANSLITERATIONS: Lazy<FxHashMap<&str, &str>> = Lazy::new(|| {
    let mut m = FxHashMap::default();
    m.insert("аквариум", "aquarium");
    m.insert("akvarium", "aquarium");
    m.insert("ария", "aria");
    m.insert("сплин", "splean");
    m.insert("би2", "bi-2");
    m.insert("би-2", "bi-2");
    m.insert("киш", "korol i shut");
    m.insert("чайф", "chaif");
    m.insert("виктор цой", "viktor tsoi");
    m.insert("валерий кипелов", "valery kipelov");
    m.insert("филипп киркоров", "philipp kirkorov");
    m.insert("валерия", "valeria");
    m.insert("егор крид", "egor kreed");
    m.insert("макс корж", "max korzh");
    m.insert("оксимирон", "oxxxymiron");
    m.insert("скриптонит", "scriptonite");
    m.insert("владимир высоцкий", "vladimir vysotsky");
    m.insert("ляпис трубецкой", "lyapis trubetskoy");
    m.insert("григорий лепс", "grigory leps");
    m.insert("тату", "tatu");
    m.insert("кино", "kino");
    m.insert("אייל גולן", "eyal golan");
    m.insert("מוש בן ארי", "mosh ben ari");
    m.insert("אריק איינשטיין", "arik einstein");
    m.insert("טיפקס", "tipex");
    m.insert("הדג נחש", "hadag nahash");
    m.insert("עומר אדם", "omer adam");
    m.insert("נעמי שמר", "naomi shemer");
    m.insert("משה פרץ", "moshe peretz");
    m.insert("ישי ריבו", "ishay ribo");
    m.insert("שלום חנוך", "shalom hanoch");
    m.insert("קפה שחור חזק", "cafe shahor hazak");
    m.insert("אייל גולן ומשה פרץ", "eyal golan and moshe peretz");
    m.insert("הדס קליינמן ואביב בכר", "hadas kleinman and aviv bachar");
    m
});

// ============================================================================
// HELPERS
// ============================================================================

fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0xFE20..=0xFE2F)
}

fn fold_to_ascii(s: &str) -> String {
    let stripped: String = s.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    any_ascii(&stripped).to_lowercase()
}

fn normalize_punctuation(s: &str) -> String {
    let result = s
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{00B4}', '\u{0060}'], "'")
        .replace(" & ", " and ")
        .replace("?t ", "'t ")
        .replace("?s ", "'s ")
        .replace("?m ", "'m ")
        .replace("?ve ", "'ve ")
        .replace("?re ", "'re ")
        .replace("?ll ", "'ll ")
        .replace(" s ", "'s ")
        .replace(" t ", "'t ")
        .replace(" m ", "'m ")
        .replace(" ve ", "'ve ")
        .replace(" re ", "'re ")
        .replace(" ll ", "'ll ");
    MULTI_SPACE.replace_all(&result, " ").to_string()
}

/// Clean a recording (track) title: strip track numbers, bracket/year
/// suffixes, remaster/live/deluxe/mix noise, and fold to ASCII.
pub fn clean_recording(title: &str) -> String {
    let mut result = normalize_punctuation(title);
    result = FILE_EXTENSION.replace(&result, "").to_string();
    result = TRACK_NUMBER_PREFIX.replace(&result, "").to_string();
    result = TRACK_NUMBER_SPACE_PREFIX.replace(&result, "$1").to_string();
    result = TRACK_NUMBER_BRACKET.replace(&result, "").to_string();
    result = TRACK_ARTIST_TITLE.replace(&result, "").to_string();
    result = BRACKET_SUFFIX.replace(&result, "").to_string();
    result = YEAR_SUFFIX.replace(&result, "").to_string();
    result = MOJIBAKE_SUFFIX.replace(&result, "").to_string();

    for pattern in TITLE_PATTERNS.iter() {
        result = pattern.replace_all(&result, "").to_string();
    }

    let mut normalized = fold_to_ascii(&result).trim().to_string();
    if normalized.starts_with("the ") && normalized.len() > 6 {
        normalized = normalized[4..].to_string();
    }
    normalized
}

/// Clean an artist name: strip featured-artist lists, band-type suffixes,
/// "The" prefix/suffix, and apply known non-Latin transliterations.
pub fn clean_artist(artist: &str) -> String {
    let mut result = normalize_punctuation(artist);
    for pattern in ARTIST_PATTERNS.iter() {
        result = pattern.replace_all(&result, "").to_string();
    }

    let pre_fold_key = result.trim().to_lowercase();
    if let Some(&transliterated) = ARTIST_TRANSLITERATIONS.get(pre_fold_key.as_str()) {
        return transliterated.to_string();
    }

    let mut normalized = fold_to_ascii(&result).trim().to_lowercase();
    if normalized.starts_with("the ") {
        normalized = normalized[4..].to_string();
    }
    if normalized.ends_with(", the") {
        normalized = normalized[..normalized.len() - 5].to_string();
    }
    if normalized.ends_with(" (the)") {
        normalized = normalized[..normalized.len() - 6].to_string();
    }

    ARTIST_TRANSLITERATIONS
        .get(normalized.as_str())
        .map(|&s| s.to_string())
        .unwrap_or(normalized)
}

/// Extract the primary (first) artist from a multi-artist string, e.g.
/// "Duck Sauce, A-Trak & Armand Van Helden" -> Some("duck sauce").
/// Returns `None` if no separator is found.
pub fn extract_primary_artist(artist_clean: &str) -> Option<String> {
    let m = ARTIST_SEPARATOR.find(artist_clean)?;
    let primary = artist_clean[..m.start()].trim();
    if primary.is_empty() || primary.len() < 2 {
        return None;
    }
    let mut result = primary.to_string();
    if result.starts_with("the ") {
        result = result[4..].to_string();
    }
    Some(result)
}
