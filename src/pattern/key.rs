// Musical key - Root pitch class and mode parsed from "<root><accidental?> <mode>"

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Pitch class (one of the twelve semitones of an octave), sharp spelling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PitchClass {
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

impl PitchClass {
    pub const ALL: [PitchClass; 12] = [
        PitchClass::C,
        PitchClass::CSharp,
        PitchClass::D,
        PitchClass::DSharp,
        PitchClass::E,
        PitchClass::F,
        PitchClass::FSharp,
        PitchClass::G,
        PitchClass::GSharp,
        PitchClass::A,
        PitchClass::ASharp,
        PitchClass::B,
    ];

    /// Semitones above C (0-11)
    pub fn semitone(self) -> u8 {
        self as u8
    }

    /// Pitch class for a semitone offset (wraps every octave)
    pub fn from_semitone(semitone: u8) -> Self {
        Self::ALL[(semitone % 12) as usize]
    }

    /// Canonical (sharp) name, e.g. "F#"
    pub fn name(self) -> &'static str {
        match self {
            PitchClass::C => "C",
            PitchClass::CSharp => "C#",
            PitchClass::D => "D",
            PitchClass::DSharp => "D#",
            PitchClass::E => "E",
            PitchClass::F => "F",
            PitchClass::FSharp => "F#",
            PitchClass::G => "G",
            PitchClass::GSharp => "G#",
            PitchClass::A => "A",
            PitchClass::ASharp => "A#",
            PitchClass::B => "B",
        }
    }

    /// Parse a root name: a letter A-G followed by an optional `#` or `b`.
    /// Flat spellings resolve to their enharmonic sharp (Bb -> A#).
    pub fn from_name(name: &str) -> Option<Self> {
        let mut chars = name.chars();
        let natural: i8 = match chars.next()? {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return None,
        };
        let accidental: i8 = match chars.next() {
            None => 0,
            Some('#') | Some('♯') => 1,
            Some('b') | Some('♭') => -1,
            Some(_) => return None,
        };
        if chars.next().is_some() {
            return None;
        }

        Some(Self::from_semitone((natural + accidental).rem_euclid(12) as u8))
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Key mode. Parsed and kept, but pitch selection does not depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    Major,
    #[default]
    Minor,
}

impl Mode {
    fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "major" | "maj" => Some(Mode::Major),
            "minor" | "min" => Some(Mode::Minor),
            _ => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Major => f.write_str("major"),
            Mode::Minor => f.write_str("minor"),
        }
    }
}

/// Musical key of a pattern
///
/// The key text is kept so a pattern serializes back exactly as it
/// was supplied. Parsing never fails: an unrecognized root falls back to C
/// and an unrecognized mode falls back to minor.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Key {
    text: String,
    root: PitchClass,
    mode: Mode,
}

impl Key {
    pub const DEFAULT_ROOT: PitchClass = PitchClass::C;
    pub const DEFAULT_TEXT: &'static str = "C minor";

    /// Parse a key string such as "F# major" or "Bb minor"
    pub fn parse(text: &str) -> Self {
        let mut tokens = text.split_whitespace();
        let root = tokens
            .next()
            .and_then(PitchClass::from_name)
            .unwrap_or(Self::DEFAULT_ROOT);
        let mode = tokens.next().and_then(Mode::from_token).unwrap_or_default();

        Self {
            text: text.to_string(),
            root,
            mode,
        }
    }

    /// Build a key from its parts
    pub fn new(root: PitchClass, mode: Mode) -> Self {
        Self {
            text: format!("{} {}", root, mode),
            root,
            mode,
        }
    }

    pub fn root(&self) -> PitchClass {
        self.root
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Key text as supplied
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl Default for Key {
    fn default() -> Self {
        Self::parse(Self::DEFAULT_TEXT)
    }
}

impl FromStr for Key {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<String> for Key {
    fn from(text: String) -> Self {
        Self::parse(&text)
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.text
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
