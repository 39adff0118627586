//! # Error Handling Framework
//! 
//! This module provides a comprehensive error handling system for the ERP application.
//! It implements structured error management with:
//! 
//! ## Core Features
//! 
//! - **Structured Error Types**: Categorized error codes for consistent handling
//! - **Rich Context**: Request context and error metadata for debugging
//! - **Severity Classification**: Error categorization for appropriate responses
//! - **Metrics Integration**: Error tracking and monitoring capabilities
//! - **User-Friendly Messages**: Localized error messages for end users
//! 
//! ## Error Categories
//! 
//! - **Validation**: Input validation and business rule violations
//! - **Authentication**: Identity verification and authorization failures
//! - **Database**: Persistence layer errors and constraint violations
//! - **Network**: External service communication failures
//! - **Configuration**: System setup and configuration issues
//! - **Internal**: Unexpected system errors requiring investigation
//! 
//! ## Context Tracking
//! 
//! - **Request Context**: HTTP request tracking with correlation IDs
//! - **Error Context**: Structured error metadata and stack traces
//! - **Tenant Context**: Multi-tenant error isolation and tracking
//! - **User Context**: User-specific error handling and permissions
//! 
//! ## Monitoring Integration
//! 
//! - **Error Metrics**: Prometheus metrics for error rates and patterns
//! - **Structured Logging**: Consistent error logging with correlation
//! - **Alert Integration**: Critical error notification and escalation
//! - **Dashboards**: Error tracking and trend analysis
//! 
//! ## Usage Examples
//!
//! ```rust,ignore
//! use gateway_core::error::{Error, ErrorCode, Result};
//!
//! fn resolve(schemas: &[String]) -> Result<()> {
//!     if schemas.is_empty() {
//!         return Err(Error::no_valid_schemas("no schema intersected meta_schemas"));
//!     }
//!     Ok(())
//! }
//! ```

pub mod codes;
pub mod context;
pub mod framework;
pub mod metrics;

pub use codes::ErrorCode;
pub use context::{ErrorContext, RequestContext};
pub use framework::{Error, ErrorCategory, ErrorSeverity, Result};
pub use metrics::ErrorMetrics;