use crate::foundation::error::{GraphError, GraphResult};
use crate::format::ValueFormat;

/// Pick the format for one edge.
///
/// Sink preferences are tried in order; the first one that merges with any source offer into a
/// concrete format wins. Offers are scanned in source order, so the source breaks ties.
pub fn negotiate(accepts: &[ValueFormat], offers: &[ValueFormat]) -> GraphResult<ValueFormat> {
    for accept in accepts {
        for offer in offers {
            if accept.tag() != offer.tag() {
                continue;
            }
            if let Some(merged) = accept.merge(offer)
                && merged.is_concrete()
            {
                return Ok(merged);
            }
        }
    }
    Err(GraphError::negotiation(format!(
        "no common format: accepts [{}], offers [{}]",
        join(accepts),
        join(offers)
    )))
}

/// Whether `fmt` satisfies at least one entry of `list`.
pub fn accepts_format(list: &[ValueFormat], fmt: &ValueFormat) -> bool {
    list.iter().any(|a| a.merge(fmt).as_ref() == Some(fmt))
}

fn join(list: &[ValueFormat]) -> String {
    list.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
#[path = "../../tests/unit/format/negotiate.rs"]
mod tests;
