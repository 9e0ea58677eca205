//! Four-step job creation flow.
//!
//! `CustomerSchedule -> Locations -> ItemsVehicle -> PriceReview`, moving one
//! step at a time. Finishing from the review step yields a [`NewJob`]; storing
//! it is up to the caller.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::entities::job::{JobStatus, VehicleType};
use crate::pricing::{total_volume, JobItem, PriceQuote};
use crate::utils::geo::{Location, RouteEstimate};

#[derive(Debug, Error, PartialEq)]
pub enum WizardError {
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("Already at the first step")]
    AtFirstStep,
    #[error("Already at the last step")]
    AtLastStep,
    #[error("Jobs can only be saved from the review step")]
    NotAtReview,
    #[error("Invalid {0} coordinates")]
    InvalidLocation(&'static str),
    #[error("Item quantity must be at least 1")]
    InvalidQuantity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    CustomerSchedule,
    Locations,
    ItemsVehicle,
    PriceReview,
}

impl WizardStep {
    fn next(self) -> Option<Self> {
        match self {
            WizardStep::CustomerSchedule => Some(WizardStep::Locations),
            WizardStep::Locations => Some(WizardStep::ItemsVehicle),
            WizardStep::ItemsVehicle => Some(WizardStep::PriceReview),
            WizardStep::PriceReview => None,
        }
    }

    fn prev(self) -> Option<Self> {
        match self {
            WizardStep::CustomerSchedule => None,
            WizardStep::Locations => Some(WizardStep::CustomerSchedule),
            WizardStep::ItemsVehicle => Some(WizardStep::Locations),
            WizardStep::PriceReview => Some(WizardStep::ItemsVehicle),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishAction {
    SaveDraft,
    Publish,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// Ask the caller to route between two points; feed the answer back with
/// [`JobWizard::apply_route`].
#[derive(Debug, Clone, PartialEq)]
pub struct RouteRequest {
    pub seq: u64,
    pub origin: Location,
    pub destination: Location,
}

/// Job record produced by the wizard, ready to be stored
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub id: Uuid,
    pub status: JobStatus,
    pub customer: CustomerDetails,
    pub scheduled_date: NaiveDate,
    pub time_slot: Option<String>,
    pub pickup: Location,
    pub delivery: Location,
    pub distance_miles: f64,
    pub duration_minutes: f64,
    pub total_volume: f64,
    pub customer_price: f64,
    pub driver_price: f64,
    pub price_override_reason: Option<String>,
    pub items: Vec<String>,
    pub vehicle_type: VehicleType,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct JobWizard {
    step: WizardStep,
    customer: CustomerDetails,
    scheduled_date: Option<NaiveDate>,
    time_slot: Option<String>,
    pickup: Option<Location>,
    delivery: Option<Location>,
    route: Option<RouteEstimate>,
    route_seq: u64,
    items: Vec<JobItem>,
    vehicle: VehicleType,
    price_override: Option<(f64, String)>,
    notes: Option<String>,
}

impl Default for JobWizard {
    fn default() -> Self {
        Self::new()
    }
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

impl JobWizard {
    pub fn new() -> Self {
        Self {
            step: WizardStep::CustomerSchedule,
            customer: CustomerDetails::default(),
            scheduled_date: None,
            time_slot: None,
            pickup: None,
            delivery: None,
            route: None,
            route_seq: 0,
            items: Vec::new(),
            vehicle: VehicleType::LargeVan,
            price_override: None,
            notes: None,
        }
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn set_customer(&mut self, customer: CustomerDetails) {
        self.customer = customer;
    }

    pub fn set_schedule(&mut self, date: NaiveDate, time_slot: Option<String>) {
        self.scheduled_date = Some(date);
        self.time_slot = time_slot;
    }

    pub fn set_notes(&mut self, notes: Option<String>) {
        self.notes = notes.filter(|n| !is_blank(n));
    }

    pub fn set_pickup(&mut self, location: Location) -> Result<Option<RouteRequest>, WizardError> {
        if !location.is_valid() {
            return Err(WizardError::InvalidLocation("pickup"));
        }
        self.pickup = Some(location);
        Ok(self.locations_changed())
    }

    pub fn set_delivery(&mut self, location: Location) -> Result<Option<RouteRequest>, WizardError> {
        if !location.is_valid() {
            return Err(WizardError::InvalidLocation("delivery"));
        }
        self.delivery = Some(location);
        Ok(self.locations_changed())
    }

    pub fn clear_pickup(&mut self) {
        self.pickup = None;
        self.locations_changed();
    }

    pub fn clear_delivery(&mut self) {
        self.delivery = None;
        self.locations_changed();
    }

    fn locations_changed(&mut self) -> Option<RouteRequest> {
        self.route = None;
        // Outstanding requests no longer match the addresses
        self.route_seq += 1;
        self.route_request()
    }

    fn route_request(&self) -> Option<RouteRequest> {
        match (&self.pickup, &self.delivery) {
            (Some(origin), Some(destination)) => Some(RouteRequest {
                seq: self.route_seq,
                origin: origin.clone(),
                destination: destination.clone(),
            }),
            _ => None,
        }
    }

    /// Record a route result. Returns `false` if the locations changed since it was requested.
    pub fn apply_route(&mut self, seq: u64, route: RouteEstimate) -> bool {
        if seq != self.route_seq {
            tracing::debug!(seq, latest = self.route_seq, "Discarding stale route result");
            return false;
        }
        self.route = Some(route);
        true
    }

    pub fn route(&self) -> Option<&RouteEstimate> {
        self.route.as_ref()
    }

    pub fn add_item(&mut self, item: JobItem) -> Result<(), WizardError> {
        if item.quantity < 1 {
            return Err(WizardError::InvalidQuantity);
        }
        self.items.push(item);
        Ok(())
    }

    pub fn remove_item(&mut self, id: Uuid) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.id != id);
        self.items.len() != before
    }

    pub fn items(&self) -> &[JobItem] {
        &self.items
    }

    pub fn set_vehicle(&mut self, vehicle: VehicleType) {
        self.vehicle = vehicle;
    }

    pub fn set_price_override(&mut self, amount: f64, reason: impl Into<String>) {
        self.price_override = Some((amount, reason.into()));
    }

    pub fn clear_price_override(&mut self) {
        self.price_override = None;
    }

    /// Current quote; distance counts as zero until a route arrives
    pub fn quote(&self) -> PriceQuote {
        let distance = self.route.as_ref().map(|r| r.distance_miles).unwrap_or(0.0);
        let quote = PriceQuote::new(self.vehicle, distance, &self.items);
        match &self.price_override {
            Some((amount, reason)) => quote.with_override(*amount, reason.clone()),
            None => quote,
        }
    }

    fn missing_for(&self, step: WizardStep) -> Vec<&'static str> {
        let mut missing = Vec::new();
        match step {
            WizardStep::CustomerSchedule => {
                if is_blank(&self.customer.name) {
                    missing.push("customer name");
                }
                if is_blank(&self.customer.email) {
                    missing.push("customer email");
                }
                if is_blank(&self.customer.phone) {
                    missing.push("customer phone");
                }
                if self.scheduled_date.is_none() {
                    missing.push("scheduled date");
                }
            }
            WizardStep::Locations => {
                if self.pickup.is_none() {
                    missing.push("pickup");
                }
                if self.delivery.is_none() {
                    missing.push("delivery");
                }
            }
            WizardStep::ItemsVehicle => {
                if self.items.is_empty() {
                    missing.push("items");
                }
            }
            WizardStep::PriceReview => {}
        }
        missing
    }

    /// Move forward one step. Entering the locations step with both
    /// addresses known asks for a fresh route.
    pub fn next(&mut self) -> Result<Option<RouteRequest>, WizardError> {
        let missing = self.missing_for(self.step);
        if !missing.is_empty() {
            return Err(WizardError::MissingFields(missing));
        }

        let next = self.step.next().ok_or(WizardError::AtLastStep)?;
        self.step = next;

        if next == WizardStep::Locations {
            self.route_seq += 1;
            return Ok(self.route_request());
        }
        Ok(None)
    }

    pub fn back(&mut self) -> Result<(), WizardError> {
        self.step = self.step.prev().ok_or(WizardError::AtFirstStep)?;
        Ok(())
    }

    pub fn finish(&self, action: FinishAction) -> Result<NewJob, WizardError> {
        if self.step != WizardStep::PriceReview {
            return Err(WizardError::NotAtReview);
        }

        let mut missing = Vec::new();
        if self.pickup.is_none() {
            missing.push("pickup");
        }
        if self.delivery.is_none() {
            missing.push("delivery");
        }
        if is_blank(&self.customer.name) {
            missing.push("customer name");
        }
        if self.scheduled_date.is_none() {
            missing.push("scheduled date");
        }

        let (Some(pickup), Some(delivery), Some(scheduled_date), true) = (
            self.pickup.clone(),
            self.delivery.clone(),
            self.scheduled_date,
            missing.is_empty(),
        ) else {
            return Err(WizardError::MissingFields(missing));
        };

        let quote = self.quote();
        let (distance_miles, duration_minutes) = self
            .route
            .as_ref()
            .map(|r| (r.distance_miles, r.duration_minutes))
            .unwrap_or((0.0, 0.0));

        Ok(NewJob {
            id: Uuid::new_v4(),
            status: match action {
                FinishAction::SaveDraft => JobStatus::Draft,
                FinishAction::Publish => JobStatus::Available,
            },
            customer: self.customer.clone(),
            scheduled_date,
            time_slot: self.time_slot.clone(),
            pickup,
            delivery,
            distance_miles,
            duration_minutes,
            total_volume: total_volume(&self.items),
            customer_price: quote.customer_price(),
            driver_price: quote.driver_price(),
            price_override_reason: quote.manual_override.map(|o| o.reason),
            items: self.items.iter().map(JobItem::label).collect(),
            vehicle_type: self.vehicle,
            notes: self.notes.clone(),
        })
    }
}
