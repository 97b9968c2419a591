use std::sync::Arc;

use crate::modules::orders::core::ports::OrderStore;
use crate::modules::orders::use_cases::create_order::handler::CreateOrderHandler;
use crate::modules::orders::use_cases::update_order::handler::UpdateOrderHandler;
use crate::modules::orders::use_cases::update_order_status::handler::UpdateOrderStatusHandler;
use crate::modules::shipments::use_cases::request_shipment::handler::RequestShipmentHandler;
use crate::shared::infrastructure::circuit_breaker::CircuitBreaker;
use crate::shared::infrastructure::database::HealthProbe;
use crate::shared::infrastructure::dead_letter::DeadLetterStore;
use crate::shared::infrastructure::ratelimit::{AdaptiveRateLimiter, KeyedRateLimiter};

/// Admission pieces shared by the middleware stack and the admin surface.
pub struct AdmissionState {
    pub global: Arc<AdaptiveRateLimiter>,
    pub per_ip: Arc<KeyedRateLimiter>,
    pub per_endpoint: Arc<KeyedRateLimiter>,
    pub breaker: Arc<CircuitBreaker>,
    pub trust_forwarded_for: bool,
}

#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<dyn OrderStore>,
    pub dead_letters: Arc<dyn DeadLetterStore>,
    pub health: Arc<dyn HealthProbe>,
    pub create_order: Arc<CreateOrderHandler>,
    pub update_order: Arc<UpdateOrderHandler>,
    pub update_order_status: Arc<UpdateOrderStatusHandler>,
    pub request_shipment: Arc<RequestShipmentHandler>,
    pub admission: Arc<AdmissionState>,
    pub bus_configured: bool,
}
