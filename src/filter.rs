use crate::config::Criteria;
use crate::types::{Listing, ListingKind};

/// Whether a listing satisfies the configured criteria.
///
/// Units must fall inside every bound. Clusters only need their rent range to
/// overlap `[min_rent, max_rent]`; area and room bounds are not applied to them.
pub fn is_eligible(listing: &Listing, criteria: &Criteria) -> bool {
    match listing.kind {
        ListingKind::Unit => {
            let rent = listing.price.min();
            let area = listing.area.min();
            let rooms = listing.rooms.min();
            (criteria.min_rent..=criteria.max_rent).contains(&rent)
                && area >= criteria.min_area
                && (criteria.min_rooms..=criteria.max_rooms).contains(&rooms)
        }
        ListingKind::Cluster => {
            !(listing.price.max() < criteria.min_rent || listing.price.min() > criteria.max_rent)
        }
    }
}

/// Keep the listings that pass [`is_eligible`], preserving input order.
pub fn filter_eligible(listings: &[Listing], criteria: &Criteria) -> Vec<Listing> {
    listings
        .iter()
        .filter(|l| is_eligible(l, criteria))
        .cloned()
        .collect()
}
