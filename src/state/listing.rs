use serde::{Deserialize, Serialize};

/// Service listing: an offer to provide a service for a fixed token price.
///
/// The engine only needs the lookup contract `listing -> (price, provider)`;
/// full listing CRUD lives outside this crate. A listing is *exclusively
/// taken* while any active request references it; that check lives on
/// `State`, which can see the requests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Listing {
    pub id: u64,
    pub provider_id: String,
    pub title: String,
    /// Token price, copied into the request as its reward at creation time
    pub price: u64,
}

impl Listing {
    pub fn new(id: u64, provider_id: String, title: String, price: u64) -> Self {
        Listing {
            id,
            provider_id,
            title,
            price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_creation() {
        let listing = Listing::new(1, "bob".to_string(), "Bike repair".to_string(), 50);
        assert_eq!(listing.id, 1);
        assert_eq!(listing.provider_id, "bob");
        assert_eq!(listing.price, 50);
    }
}
