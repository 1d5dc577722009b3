use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Map, Value};
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::models;
use crate::query;
use crate::routes::{
	acl, admins, auth, commissioners, complaints, contact, dashboard, faqs, health, media, news, notifications,
	requests, resources, settings, users,
};

struct BearerAuth;

impl Modify for BearerAuth {
	fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
		let components = openapi.components.get_or_insert_with(Default::default);
		let mut scheme = Http::new(HttpAuthScheme::Bearer);
		scheme.bearer_format = Some("JWT".to_string());
		components.add_security_scheme("bearerAuth", SecurityScheme::Http(scheme));
	}
}

#[derive(OpenApi)]
#[openapi(
	info(title = "Transparency Portal API", description = "Right-to-information portal backend"),
	paths(
		health::health,
		auth::signup,
		auth::login,
		auth::logout,
		auth::authenticated,
		auth::resend_otp,
		auth::verify_otp,
		auth::send_reset_password_otp,
		auth::verify_reset_password_otp,
		auth::reset_password,
		auth::is_available,
		users::list_users,
		users::create_user,
		users::user_stats,
		users::get_user,
		users::update_user,
		users::delete_user,
		users::update_profile,
		users::change_password,
		admins::list_admins,
		admins::create_admin,
		admins::get_admin,
		admins::update_admin,
		admins::delete_admin,
		acl::list_roles,
		acl::create_role,
		acl::get_role,
		acl::update_role,
		acl::delete_role,
		acl::role_permissions,
		acl::assign_permission_to_role,
		acl::remove_permission_from_role,
		acl::list_permissions,
		acl::create_permission,
		acl::get_permission,
		acl::update_permission,
		acl::delete_permission,
		acl::assign_role,
		acl::remove_role,
		acl::assign_permission,
		acl::remove_permission,
		acl::user_roles,
		acl::user_permissions,
		acl::check_permission,
		acl::check_role,
		requests::create_request,
		requests::list_requests,
		requests::export_requests,
		requests::get_request,
		requests::update_request,
		requests::update_request_status,
		requests::delete_request,
		complaints::create_complaint,
		complaints::list_complaints,
		complaints::export_complaints,
		complaints::get_complaint,
		complaints::update_complaint,
		complaints::delete_complaint,
		commissioners::list_commissioners,
		commissioners::list_all_commissioners,
		commissioners::export_commissioners,
		commissioners::get_commissioner,
		commissioners::create_commissioner,
		commissioners::update_commissioner,
		commissioners::delete_commissioner,
		news::list_published_news,
		news::show_published_news,
		news::featured_news,
		news::list_news,
		news::export_news,
		news::get_news,
		news::create_news,
		news::update_news,
		news::delete_news,
		resources::list_published_resources,
		resources::download_resource,
		resources::list_resources,
		resources::export_resources,
		resources::get_resource,
		resources::create_resource,
		resources::update_resource,
		resources::update_resource_status,
		resources::delete_resource,
		faqs::list_public_faqs,
		faqs::list_faqs,
		faqs::export_faqs,
		faqs::get_faq,
		faqs::create_faq,
		faqs::update_faq,
		faqs::delete_faq,
		settings::settings_json,
		settings::list_settings,
		settings::get_setting,
		settings::get_setting_by_key,
		settings::upsert_setting,
		settings::update_setting,
		settings::delete_setting,
		contact::submit_contact_message,
		contact::list_contact_messages,
		contact::get_contact_message,
		contact::delete_contact_message,
		notifications::list_notifications,
		notifications::unread_count,
		notifications::mark_read,
		notifications::mark_multiple_read,
		notifications::mark_all_read,
		notifications::create_global_notification,
		notifications::create_user_notification,
		dashboard::dashboard,
		media::upload_media,
		media::delete_media
	),
	components(
		schemas(
			health::HealthResponse,
			models::MessageResponse,
			models::PageDoc,
			models::PublishStatus,
			query::PageMeta,
			models::user::User,
			models::user::Gender,
			models::user::UserWithAccess,
			models::user::SignupRequest,
			models::user::LoginRequest,
			models::user::AuthResponse,
			models::user::EmailRequest,
			models::user::OtpRequest,
			models::user::ResetPasswordRequest,
			models::user::AvailabilityResponse,
			models::user::UserCreateRequest,
			models::user::UserUpdateRequest,
			models::user::ProfileUpdateRequest,
			models::user::ChangePasswordRequest,
			models::rbac::Role,
			models::rbac::Permission,
			models::rbac::PermissionSummary,
			models::rbac::AclEntryCreateRequest,
			models::rbac::AclEntryUpdateRequest,
			models::rbac::RolePermissionRequest,
			models::rbac::UserRoleRequest,
			models::rbac::UserPermissionRequest,
			models::rbac::PermissionCheckResponse,
			models::rbac::RoleCheckResponse,
			models::request::InfoRequest,
			models::request::InfoRequestPayload,
			models::request::InfoRequestUpdate,
			models::request::StatusUpdate,
			models::request::ApplicantType,
			models::request::MannerOfAccess,
			models::request::FormOfAccess,
			models::request::RequestStatus,
			models::complaint::Complaint,
			models::complaint::ComplaintPayload,
			models::complaint::ComplaintUpdate,
			models::complaint::ComplaintType,
			models::complaint::ComplaintPriority,
			models::complaint::ComplaintStatus,
			models::commissioner::Commissioner,
			models::commissioner::CommissionerView,
			models::commissioner::CommissionerPayload,
			models::commissioner::CommissionerUpdate,
			models::commissioner::CommissionerStatus,
			models::news::News,
			models::news::NewsView,
			models::news::NewsPayload,
			models::news::NewsUpdate,
			models::news::NewsCategory,
			models::resource::Resource,
			models::resource::ResourceView,
			models::resource::DownloadResponse,
			models::resource::ResourcePayload,
			models::resource::ResourceUpdate,
			models::resource::ResourceCategory,
			models::resource::ResourceType,
			models::faq::Faq,
			models::faq::FaqPayload,
			models::faq::FaqUpdate,
			models::setting::SettingView,
			models::setting::SettingPayload,
			models::setting::SettingUpdate,
			models::contact::ContactMessage,
			models::contact::ContactPayload,
			models::notification::NotificationView,
			models::notification::NotificationPayload,
			models::notification::NotificationType,
			models::notification::MarkMultipleRequest,
			models::notification::MarkMultipleResponse,
			models::notification::UnreadCountResponse,
			models::dashboard::DashboardResponse,
			models::dashboard::MetricChange,
			models::dashboard::Totals,
			models::dashboard::SeriesPoint,
			models::dashboard::Period,
			models::media::Media,
			models::media::MediaView
		)
	),
	modifiers(&BearerAuth),
	tags(
		(name = "Health", description = "Liveness and database probe"),
		(name = "Auth", description = "Signup, login, OTP verification and password reset"),
		(name = "Users", description = "Account management"),
		(name = "Admins", description = "Administrator accounts"),
		(name = "ACL", description = "Roles, permissions and grants"),
		(name = "Requests", description = "Access-to-information requests"),
		(name = "Complaints", description = "Complaints about handling of requests"),
		(name = "Commissioners", description = "Commissioner profiles"),
		(name = "News", description = "News articles"),
		(name = "Resources", description = "Downloadable documents"),
		(name = "FAQs", description = "Frequently asked questions"),
		(name = "Settings", description = "Site settings"),
		(name = "Contact", description = "Contact-us messages"),
		(name = "Notifications", description = "In-app notifications"),
		(name = "Dashboard", description = "Period metrics"),
		(name = "Media", description = "File uploads")
	)
)]
pub struct ApiDoc;

pub fn build_openapi(port: u16) -> anyhow::Result<utoipa::openapi::OpenApi> {
	let mut doc = serde_json::to_value(ApiDoc::openapi())?;

	normalize_path_operations(&mut doc);
	ensure_servers(&mut doc, port);
	add_examples(&mut doc);

	Ok(serde_json::from_value(doc)?)
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> anyhow::Result<Router> {
	let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
		.try_it_out_enabled(true)
		.with_credentials(true)
		.persist_authorization(true);

	let doc_json = Arc::new(serde_json::to_value(&doc)?);

	let json_route = get(move || {
		let doc_json = Arc::clone(&doc_json);
		async move { Json((*doc_json).clone()) }
	});

	Ok(Router::new()
		.route("/api-docs/openapi.json", json_route)
		.merge(SwaggerUi::new("/docs").config(swagger_config)))
}

/// Lowercases method keys and merges operations that differ only by case.
fn normalize_path_operations(doc: &mut Value) {
	if let Some(paths) = doc.get_mut("paths").and_then(Value::as_object_mut) {
		let snapshot = paths.clone();
		for (path, item) in snapshot {
			if let Some(ops) = item.as_object() {
				let mut normalized = Map::new();
				for (method, val) in ops {
					let key = method.to_lowercase();
					if let Some(existing) = normalized.get_mut(&key) {
						merge_values(existing, val);
					} else {
						normalized.insert(key, val.clone());
					}
				}
				paths.insert(path, Value::Object(normalized));
			}
		}
	}
}

fn add_examples(doc: &mut Value) {
	if let Some(paths) = doc.get_mut("paths").and_then(Value::as_object_mut) {
		for item in paths.values_mut() {
			if let Some(operations) = item.as_object_mut() {
				for operation in operations.values_mut() {
					apply_parameter_examples(operation);
					apply_request_examples(operation);
				}
			}
		}
	}
}

fn apply_parameter_examples(operation: &mut Value) {
	let Some(parameters) = operation.get_mut("parameters").and_then(Value::as_array_mut) else { return; };
	for parameter in parameters.iter_mut() {
		if parameter.get("name").and_then(Value::as_str) == Some("uuid") {
			if let Some(obj) = parameter.as_object_mut() {
				obj.entry("example")
					.or_insert_with(|| json!("00000000-0000-4000-8000-000000000000"));
			}
		}
	}
}

fn apply_request_examples(operation: &mut Value) {
	let Some(request_body) = operation.get_mut("requestBody") else { return; };
	let Some(content) = request_body.get_mut("content").and_then(Value::as_object_mut) else { return; };
	let Some(app_json) = content.get_mut("application/json").and_then(Value::as_object_mut) else { return; };
	let Some(schema) = app_json.get("schema").and_then(Value::as_object) else { return; };
	let Some(reference) = schema.get("$ref").and_then(Value::as_str) else { return; };

	let example = match reference {
		"#/components/schemas/LoginRequest" => Some(json!({
			"email": "clerk@example.org",
			"password": "S3cureP@ssw0rd"
		})),
		"#/components/schemas/SignupRequest" => Some(json!({
			"full_name": "Ama Mensah",
			"email": "ama@example.org",
			"password": "S3cureP@ssw0rd"
		})),
		"#/components/schemas/ComplaintPayload" => Some(json!({
			"type": "Excessive Delay in Report",
			"date_of_incident": "2025-02-14",
			"description": "No response after 30 days.",
			"full_name": "Kofi Boateng",
			"email": "kofi@example.org"
		})),
		"#/components/schemas/FaqPayload" => Some(json!({
			"question": "How long does a request take?",
			"answer": "Institutions must respond within 14 days."
		})),
		_ => None,
	};
	if let Some(example) = example {
		app_json.insert("example".to_string(), example);
	}
}

fn ensure_servers(doc: &mut Value, port: u16) {
	let tls_enabled = std::env::var("TLS_CERT_PATH").is_ok() && std::env::var("TLS_KEY_PATH").is_ok();
	let scheme = if tls_enabled { "https" } else { "http" };
	let server_url = format!("{scheme}://localhost:{port}");

	match doc.get_mut("servers") {
		Some(Value::Array(arr)) => {
			let has = arr.iter().any(|v| v.get("url").and_then(Value::as_str) == Some(server_url.as_str()));
			if !has {
				arr.push(json!({ "url": server_url }));
			}
		}
		_ => {
			doc["servers"] = json!([{ "url": server_url }]);
		}
	}
}

fn merge_values(target: &mut Value, addition: &Value) {
	match (target, addition) {
		(Value::Object(dest), Value::Object(src)) => {
			for (key, value) in src {
				if let Some(existing) = dest.get_mut(key) {
					merge_values(existing, value);
				} else {
					dest.insert(key.clone(), value.clone());
				}
			}
		}
		(Value::Array(dest), Value::Array(src)) => {
			for item in src {
				if !dest.contains(item) {
					dest.push(item.clone());
				}
			}
		}
		_ => {}
	}
}
