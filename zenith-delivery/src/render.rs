//! Tracking-augmented message composition

use zenith_common::TrackingKey;
use zenith_queue::SendJob;
use zenith_transport::OutboundMessage;

/// Path of the open-tracking pixel, relative to the public base URL
#[must_use]
pub fn pixel_path(key: &TrackingKey) -> String {
    format!("/track/open/{key}")
}

/// The invisible image that reports an open when a mail client loads it
#[must_use]
pub fn tracking_pixel(public_url: &str, key: &TrackingKey) -> String {
    format!(
        r#"<img src="{}{}" width="1" height="1" alt="" />"#,
        public_url.trim_end_matches('/'),
        pixel_path(key)
    )
}

/// Append the tracking pixel to an HTML body
///
/// The pixel goes just before `</body>` when the body has one, otherwise at
/// the very end.
#[must_use]
pub fn tracked_body(body: &str, public_url: &str, key: &TrackingKey) -> String {
    let pixel = tracking_pixel(public_url, key);

    match body.to_ascii_lowercase().rfind("</body>") {
        Some(index) => format!("{}{pixel}{}", &body[..index], &body[index..]),
        None => format!("{body}{pixel}"),
    }
}

/// Build the outbound message for a job
#[must_use]
pub fn compose(job: &SendJob, public_url: &str) -> OutboundMessage {
    OutboundMessage::new(
        job.email.clone(),
        job.subject.clone(),
        tracked_body(&job.body, public_url, &job.tracking_key),
    )
    .header("X-Campaign-ID", job.campaign_id.as_str())
}
