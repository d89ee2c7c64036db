//! Wire types for the availability source API.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AvailabilityResp {
    #[serde(rename = "availableTimes", default)]
    pub available_times: Vec<AvailableTime>,
}

#[derive(Debug, Deserialize)]
pub struct AvailableTime {
    pub time: String,
    #[serde(rename = "offerId")]
    pub offer_id: String,
}

#[derive(Debug, Deserialize)]
pub struct LocationsResp {
    #[serde(default)]
    pub locations: Vec<Location>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Location {
    pub id: String,
    pub name: String,
    #[serde(rename = "facilityType", default)]
    pub facility_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RestaurantsResp {
    #[serde(default)]
    pub restaurants: Vec<Restaurant>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Restaurant {
    pub id: String,
    pub name: String,
    #[serde(rename = "cuisineType", default)]
    pub cuisine_type: Option<String>,
    #[serde(rename = "mealPeriods", default)]
    pub meal_periods: Vec<String>,
    #[serde(rename = "acceptsReservations", default)]
    pub accepts_reservations: bool,
}
