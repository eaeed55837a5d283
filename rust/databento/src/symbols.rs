//! Symbol list handling: normalization to the comma-separated wire representation
//! and chunking for subscription requests.

use dbn::SType;

use crate::{Error, Result};

/// The sentinel for requesting all symbols in a dataset.
pub const ALL_SYMBOLS: &str = "ALL_SYMBOLS";

/// A symbol list input: a single symbol or instrument ID, several of either, or all
/// symbols in the dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolList {
    /// Sentinel value for all symbols in a dataset.
    All,
    /// A single instrument ID.
    Id(u32),
    /// A set of instrument IDs.
    Ids(Vec<u32>),
    /// A single symbol.
    Symbol(String),
    /// A set of symbols.
    Symbols(Vec<String>),
}

impl SymbolList {
    /// Normalizes the symbol list into the comma-separated wire representation:
    /// whitespace stripped and symbols uppercased, with the dotted middle segment
    /// kept lowercase for continuous and parent symbology.
    ///
    /// # Errors
    /// This function returns an error if any symbol is empty after stripping.
    pub fn to_api_string(&self, stype_in: SType) -> Result<String> {
        match self {
            Self::All => Ok(ALL_SYMBOLS.to_owned()),
            Self::Id(id) => Ok(id.to_string()),
            Self::Ids(ids) => Ok(ids
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(",")),
            Self::Symbol(symbol) => normalize_symbol(symbol, stype_in),
            Self::Symbols(symbols) => Ok(symbols
                .iter()
                .map(|s| normalize_symbol(s, stype_in))
                .collect::<Result<Vec<_>>>()?
                .join(",")),
        }
    }

    /// Normalizes the symbol list into chunks of up to `chunk_size` symbols, each
    /// rendered as a comma-separated string.
    ///
    /// # Errors
    /// This function returns an error if any symbol is empty after stripping.
    pub fn to_chunked_api_string(&self, stype_in: SType, chunk_size: usize) -> Result<Vec<String>> {
        match self {
            Self::All => Ok(vec![ALL_SYMBOLS.to_owned()]),
            Self::Id(id) => Ok(vec![id.to_string()]),
            Self::Ids(ids) => Ok(ids
                .chunks(chunk_size)
                .map(|chunk| {
                    chunk
                        .iter()
                        .map(u32::to_string)
                        .collect::<Vec<_>>()
                        .join(",")
                })
                .collect()),
            Self::Symbol(symbol) => Ok(vec![normalize_symbol(symbol, stype_in)?]),
            Self::Symbols(symbols) => {
                let normalized = symbols
                    .iter()
                    .map(|s| normalize_symbol(s, stype_in))
                    .collect::<Result<Vec<_>>>()?;
                Ok(normalized
                    .chunks(chunk_size)
                    .map(|chunk| chunk.join(","))
                    .collect())
            }
        }
    }

    /// Returns the number of symbols in the list.
    pub fn len(&self) -> usize {
        match self {
            Self::All | Self::Id(_) | Self::Symbol(_) => 1,
            Self::Ids(ids) => ids.len(),
            Self::Symbols(symbols) => symbols.len(),
        }
    }

    /// Returns `true` if the list contains no symbols.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::All | Self::Id(_) | Self::Symbol(_) => false,
            Self::Ids(ids) => ids.is_empty(),
            Self::Symbols(symbols) => symbols.is_empty(),
        }
    }
}

fn normalize_symbol(symbol: &str, stype_in: SType) -> Result<String> {
    let stripped = symbol.trim();
    if stripped.is_empty() {
        return Err(Error::bad_argument("symbols", "symbol cannot be empty"));
    }
    if stripped == ALL_SYMBOLS {
        return Ok(ALL_SYMBOLS.to_owned());
    }
    match stype_in {
        // The roll rule or symbol kind in the middle segment is lowercase, e.g.
        // ES.c.0 and ES.FUT.
        SType::Continuous | SType::Parent => {
            let parts: Vec<&str> = stripped.split('.').collect();
            if parts.len() == 3 {
                Ok(format!(
                    "{}.{}.{}",
                    parts[0].to_uppercase(),
                    parts[1].to_lowercase(),
                    parts[2].to_uppercase()
                ))
            } else {
                Ok(stripped.to_uppercase())
            }
        }
        _ => Ok(stripped.to_uppercase()),
    }
}

impl From<&str> for SymbolList {
    fn from(symbol: &str) -> Self {
        if symbol == ALL_SYMBOLS {
            Self::All
        } else {
            Self::Symbol(symbol.to_owned())
        }
    }
}

impl From<String> for SymbolList {
    fn from(symbol: String) -> Self {
        Self::from(symbol.as_str())
    }
}

impl From<u32> for SymbolList {
    fn from(id: u32) -> Self {
        Self::Id(id)
    }
}

impl From<Vec<u32>> for SymbolList {
    fn from(ids: Vec<u32>) -> Self {
        Self::Ids(ids)
    }
}

impl From<Vec<String>> for SymbolList {
    fn from(symbols: Vec<String>) -> Self {
        Self::Symbols(symbols)
    }
}

impl From<Vec<&str>> for SymbolList {
    fn from(symbols: Vec<&str>) -> Self {
        Self::Symbols(symbols.into_iter().map(str::to_owned).collect())
    }
}

impl Default for SymbolList {
    fn default() -> Self {
        Self::All
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uppercases_and_strips() {
        let list = SymbolList::from(vec![" aapl ", "msft", "tsla"]);
        assert_eq!(
            list.to_api_string(SType::RawSymbol).unwrap(),
            "AAPL,MSFT,TSLA"
        );
    }

    #[test]
    fn continuous_middle_segment_is_lowercased() {
        let list = SymbolList::from("es.C.0");
        assert_eq!(list.to_api_string(SType::Continuous).unwrap(), "ES.c.0");
        let list = SymbolList::from("es.fut");
        assert_eq!(list.to_api_string(SType::Parent).unwrap(), "ES.FUT");
        let list = SymbolList::from("es.Fut.x");
        assert_eq!(list.to_api_string(SType::Parent).unwrap(), "ES.fut.X");
    }

    #[test]
    fn ids_join() {
        let list = SymbolList::from(vec![1234u32, 5678, 90]);
        assert_eq!(
            list.to_api_string(SType::InstrumentId).unwrap(),
            "1234,5678,90"
        );
    }

    #[test]
    fn all_symbols_sentinel() {
        assert_eq!(SymbolList::from(ALL_SYMBOLS), SymbolList::All);
        assert_eq!(
            SymbolList::All.to_api_string(SType::RawSymbol).unwrap(),
            ALL_SYMBOLS
        );
    }

    #[test]
    fn chunking() {
        let symbols: Vec<String> = (0..1100).map(|i| format!("S{i}")).collect();
        let list = SymbolList::from(symbols);
        let chunks = list.to_chunked_api_string(SType::RawSymbol, 500).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].split(',').count(), 500);
        assert_eq!(chunks[1].split(',').count(), 500);
        assert_eq!(chunks[2].split(',').count(), 100);
    }

    #[test]
    fn empty_symbol_is_error() {
        let list = SymbolList::from(vec!["AAPL", "  "]);
        assert!(list.to_api_string(SType::RawSymbol).is_err());
    }
}
