pub mod membership_query;
pub mod membership_update;
pub mod multicast_data;
pub mod relay_advertisement;
pub mod relay_discovery;
pub mod request;
