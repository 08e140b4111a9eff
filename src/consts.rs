pub const CLOUDINARY_API_URL: &str = "https://api.cloudinary.com/v1_1";

pub const REPLICATE_API_URL: &str = "https://api.replicate.com/v1";

pub const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub const GEMINI_DEFAULT_MODEL: &str = "gemini-1.5-flash";

pub const GEMINI_DEFAULT_TEMPERATURE: f64 = 0.7;

/// base64 length accepted inline by /api/processImage (~8-10MB of image data)
pub const MAX_INLINE_IMAGE_BASE64_LEN: usize = 12_000_000;

/// Hard cap on a single remote image downloaded for compositing
pub const MAX_REMOTE_IMAGE_BYTES: usize = 25 * 1024 * 1024;

/// Largest resized artwork the compositor will allocate (RGBA, 4 bytes each)
pub const MAX_OUTPUT_PIXELS: u64 = 40_000_000;

pub const DEFAULT_REQUEST_BODY_LIMIT: usize = 50 * 1024 * 1024; // 50MB

pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

pub const REPLICATE_POLL_INTERVAL_MS: u64 = 2_000;

pub const REPLICATE_POLL_TIMEOUT_SECS: u64 = 180;

pub const DEFAULT_PORT: u16 = 8080;

/// Endpoints advertised by the index handler
pub const PUBLIC_ENDPOINTS: &[&str] = &[
    "/api/saveMockup",
    "/api/placeArt",
    "/api/tryOn",
    "/api/processImage",
    "/api/ping",
];
