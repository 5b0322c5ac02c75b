use actix_web::web;
use utoipa::OpenApi;
use utoipa::{
    Modify,
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::entities::{
    BookingStatus, DiscountType, LedgerEntryType, PaymentStatus, ServiceKind, SettlementStatus,
    WalletKind,
};
use crate::handlers;
use crate::models::*;
use crate::services::CommissionBreakdown;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            )
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::booking::create_booking,
        handlers::booking::create_bulk_catering,
        handlers::booking::list_bookings,
        handlers::booking::get_booking,
        handlers::booking::refund_quote,
        handlers::booking::cancel_booking,
        handlers::booking::complete_booking,
        handlers::catalog::get_availability,
        handlers::coupon::validate_coupon,
        handlers::points::get_balance,
        handlers::points::get_history,
        handlers::wallet::get_wallet,
        handlers::admin::release_escrow,
        handlers::admin::refund_escrow,
        handlers::admin::partial_settle,
        handlers::admin::get_setting,
        handlers::admin::put_setting,
        handlers::admin::expire_points,
    ),
    components(
        schemas(
            BookingStatus,
            ServiceKind,
            PaymentStatus,
            SettlementStatus,
            LedgerEntryType,
            DiscountType,
            WalletKind,
            Fulfillment,
            BookingDetailsInput,
            CreateBookingRequest,
            BulkCateringItem,
            CreateBulkCateringRequest,
            BookingResponse,
            BookingOutcomeResponse,
            BulkBookingOutcomeResponse,
            RefundQuoteResponse,
            CancelBookingResponse,
            CompleteBookingResponse,
            AvailabilityResponse,
            ValidateCouponRequest,
            CouponValidationResponse,
            PointsBalanceResponse,
            PointsLedgerEntryResponse,
            ExpirePointsResponse,
            WalletResponse,
            WalletTransactionResponse,
            PartialSettleRequest,
            PaymentTransactionResponse,
            SettingResponse,
            UpdateSettingRequest,
            CommissionBreakdown,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "booking", description = "Booking API"),
        (name = "catalog", description = "Service availability API"),
        (name = "coupon", description = "Coupon API"),
        (name = "points", description = "Loyalty points API"),
        (name = "wallet", description = "Wallet API"),
        (name = "admin", description = "Escrow, settings and points administration"),
    ),
    info(
        title = "Marketplace Booking API",
        version = "1.0.0",
        description = "Booking, payment and settlement REST API documentation"
    ),
    servers(
        (url = "/api/v1", description = "Local server")
    )
)]
pub struct ApiDoc;

pub fn swagger_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
    )
    .route(
        "/swagger-ui",
        web::get().to(|| async {
            actix_web::HttpResponse::Found()
                .append_header(("Location", "/swagger-ui/"))
                .finish()
        }),
    );
}
