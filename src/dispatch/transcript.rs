use super::error::DispatchError;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptEntry {
    /// Non-directive input passed through unchanged
    Text(String),
    Called { capability: String, result: String },
    Failed {
        capability: Option<String>,
        error: DispatchError,
    },
}

impl fmt::Display for TranscriptEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscriptEntry::Text(text) => write!(f, "{}", text),
            TranscriptEntry::Called { capability, result } => {
                write!(f, "✅ called {} → {}", capability, result)
            }
            TranscriptEntry::Failed {
                capability: Some(capability),
                error,
            } => write!(f, "❌ called {} → error: {}", capability, error),
            TranscriptEntry::Failed {
                capability: None,
                error,
            } => write!(f, "❌ error: {}", error),
        }
    }
}

/// Ordered record of what a dispatch executed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    pub entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn push(&mut self, entry: TranscriptEntry) {
        self.entries.push(entry);
    }

    pub fn calls(&self) -> impl Iterator<Item = &TranscriptEntry> {
        self.entries
            .iter()
            .filter(|e| !matches!(e, TranscriptEntry::Text(_)))
    }

    pub fn failures(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, TranscriptEntry::Failed { .. }))
            .count()
    }

    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Transcript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", entry)?;
        }
        Ok(())
    }
}
