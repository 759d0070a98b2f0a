use axum::{
    extract::{Path, State},
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use zenith_common::incoming;

use crate::AppState;

/// A 1x1 transparent GIF89a
pub static TRANSPARENT_GIF: [u8; 43] = [
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

/// The pixel response, identical whatever happened to the open
pub fn pixel_response() -> Response {
    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("image/gif")),
            (
                header::CACHE_CONTROL,
                HeaderValue::from_static("no-cache, no-store, must-revalidate"),
            ),
        ],
        TRANSPARENT_GIF.as_slice(),
    )
        .into_response()
}

/// `GET /track/open/{key}`
///
/// The route captures the rest of the path, so keys with slashes in them
/// still get the pixel (and are then rejected as malformed).
///
/// The open is recorded on its own task. The response waits for it at most
/// `open_wait`; a slow ledger or store delays the count, never the pixel.
pub async fn open_pixel(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    let engine = state.engine.clone();
    let recording = tokio::spawn(async move {
        let outcome = engine.record_open(&key).await;
        incoming!(level = TRACE, "Pixel load for {key:?}: {outcome:?}");
    });

    if tokio::time::timeout(state.open_wait, recording).await.is_err() {
        incoming!(
            level = DEBUG,
            "Open not recorded within {:?}, serving the pixel first",
            state.open_wait
        );
    }

    pixel_response()
}

/// `GET /track/open/`
pub async fn keyless_pixel() -> Response {
    incoming!(level = TRACE, "Pixel load without a tracking key");
    pixel_response()
}
