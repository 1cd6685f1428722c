//! Security audit logging for authentication events
//!
//! All audit events are logged at INFO level with the "audit" target,
//! making them easy to filter and route to security monitoring systems.
//! Rejection reasons that clients never see (expired, revoked, wrong type,
//! corrupt hash) are only recorded here.
//!
//! # Example
//!
//! ```ignore
//! use scribe_api::audit::{audit_log, AuditEvent};
//!
//! audit_log(&AuditEvent::LoginSuccess {
//!     subject_id: "42".to_string(),
//!     username: "alice".to_string(),
//!     ip_address: Some("192.168.1.1".to_string()),
//!     user_agent: None,
//!     rehashed: false,
//! });
//! ```
//!
//! Author: hephaex@gmail.com

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Security audit events for authentication and authorization
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// Successful user login
    LoginSuccess {
        subject_id: String,
        username: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
        /// Stored hash was replaced at current parameters
        rehashed: bool,
    },

    /// Failed login attempt
    LoginFailure {
        username: String,
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// User logout
    Logout {
        subject_id: String,
        username: String,
        ip_address: Option<String>,
        refresh_revoked: bool,
    },

    /// Refresh token exchanged for a new pair
    TokenRefresh {
        ip_address: Option<String>,
        user_agent: Option<String>,
        success: bool,
    },

    /// Password change
    PasswordChange {
        subject_id: String,
        username: String,
        ip_address: Option<String>,
        success: bool,
    },

    /// Access denied due to insufficient role
    AccessDenied {
        subject_id: String,
        role: String,
        resource: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Invalid, expired or revoked token presented
    InvalidToken {
        resource: String,
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },
}

/// Log a security audit event with structured fields
pub fn audit_log(event: &AuditEvent) {
    let timestamp = Utc::now();

    let event_json = serde_json::to_string(event)
        .unwrap_or_else(|e| format!("{{\"error\":\"Failed to serialize audit event: {e}\"}}"));

    match event {
        AuditEvent::LoginSuccess {
            subject_id,
            username,
            ip_address,
            rehashed,
            ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                subject_id = %subject_id,
                username = %username,
                ip_address = ?ip_address,
                rehashed = %rehashed,
                "Login successful"
            );
        }
        AuditEvent::LoginFailure {
            username,
            reason,
            ip_address,
            ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                username = %username,
                reason = %reason,
                ip_address = ?ip_address,
                "Login failed"
            );
        }
        AuditEvent::Logout {
            subject_id,
            username,
            ip_address,
            refresh_revoked,
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                subject_id = %subject_id,
                username = %username,
                ip_address = ?ip_address,
                refresh_revoked = %refresh_revoked,
                "User logout"
            );
        }
        AuditEvent::TokenRefresh {
            ip_address,
            success,
            ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                ip_address = ?ip_address,
                success = %success,
                "Token refresh"
            );
        }
        AuditEvent::PasswordChange {
            subject_id,
            username,
            ip_address,
            success,
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                subject_id = %subject_id,
                username = %username,
                ip_address = ?ip_address,
                success = %success,
                "Password change"
            );
        }
        AuditEvent::AccessDenied {
            subject_id,
            role,
            resource,
            ip_address,
            ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                subject_id = %subject_id,
                role = %role,
                resource = %resource,
                ip_address = ?ip_address,
                "Access denied"
            );
        }
        AuditEvent::InvalidToken {
            resource,
            reason,
            ip_address,
            ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                resource = %resource,
                reason = %reason,
                ip_address = ?ip_address,
                "Invalid token"
            );
        }
    }
}

/// Extract IP address from request headers
///
/// Checks X-Forwarded-For, then X-Real-IP.
pub fn extract_ip_address(headers: &axum::http::HeaderMap) -> Option<String> {
    // Check X-Forwarded-For (proxy/load balancer)
    if let Some(xff) = headers.get("x-forwarded-for") {
        if let Ok(xff_str) = xff.to_str() {
            // Take the first IP in the chain (client IP)
            if let Some(first_ip) = xff_str.split(',').next() {
                return Some(first_ip.trim().to_string());
            }
        }
    }

    // Check X-Real-IP (nginx proxy)
    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            return Some(ip_str.to_string());
        }
    }

    None
}

/// Extract user agent from request headers
pub fn extract_user_agent(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|ua| ua.to_str().ok())
        .map(|s| s.to_string())
}
