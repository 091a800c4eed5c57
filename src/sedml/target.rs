//! SED-ML targets
//!
//! Variables and changes address SBML elements with XPath expressions such as
//! `/sbml:sbml/sbml:model/sbml:listOfSpecies/sbml:species[@id='S1']`, optionally
//! followed by an attribute step (`/@initialConcentration`). Only selection by id is
//! supported; that covers what SED-ML tools emit in practice.

use lazy_static::lazy_static;
use regex::Regex;

use super::error::SedmlError;

/// Symbol URN for simulation time
pub const TIME_SYMBOL: &str = "urn:sedml:symbol:time";

lazy_static! {
    static ref ID_SELECTOR: Regex = Regex::new(r#"\[\s*@id\s*=\s*['"]([^'"]+)['"]\s*\]"#).unwrap();
    static ref ATTRIBUTE_STEP: Regex = Regex::new(r"/@(?:[A-Za-z_][\w.-]*:)?([A-Za-z_][\w.-]*)\s*$").unwrap();
}

/// A resolved XPath target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Id of the selected element
    pub id: String,
    /// Trailing attribute step, if any
    pub attribute: Option<String>,
}

impl Target {
    /// Resolves `xpath` to the element id it selects
    ///
    /// # Errors
    ///
    /// Returns [`SedmlError::InvalidTarget`] if the expression does not select an
    /// element by id.
    pub fn parse(xpath: &str) -> Result<Self, SedmlError> {
        let invalid = || SedmlError::InvalidTarget(xpath.to_string());

        // The last id predicate selects the innermost element
        let id = ID_SELECTOR
            .captures_iter(xpath)
            .last()
            .and_then(|captures| captures.get(1))
            .map(|id| id.as_str().to_string())
            .ok_or_else(invalid)?;

        let attribute = ATTRIBUTE_STEP
            .captures(xpath)
            .and_then(|captures| captures.get(1))
            .map(|attribute| attribute.as_str().to_string());

        Ok(Self { id, attribute })
    }
}

/// Whether `symbol` is the SED-ML time symbol
pub fn is_time_symbol(symbol: &str) -> bool {
    symbol.trim() == TIME_SYMBOL
}
