pub const PROFILE_IMAGE_BUCKET: &str = "profile-images";
pub const PROFILE_IMAGE_FOLDER: &str = "avatars";
pub const POST_IMAGE_BUCKET: &str = "post-images";

const PUBLIC_OBJECT_PATH: &str = "storage/v1/object/public";

/// Builds the public URL of an object stored in a public storage bucket.
///
/// `base_url` is the project URL (`https://xxxx.supabase.co`), stray slashes
/// between the parts are collapsed.
pub fn public_object_url(base_url: &str, bucket: &str, path: &str) -> String {
    let prefix = public_object_prefix(base_url);
    let bucket = bucket.trim_matches('/');
    let path = path.trim_start_matches('/');

    format!("{prefix}{bucket}/{path}")
}

/// Everything served from the project's public buckets starts with this prefix.
pub fn public_object_prefix(base_url: &str) -> String {
    let base_url = base_url.trim().trim_end_matches('/');

    format!("{base_url}/{PUBLIC_OBJECT_PATH}/")
}

/// Whether `url` points at an object in one of the project's public buckets.
///
/// Dot segments are refused so a path cannot climb out of the public prefix.
pub fn is_public_object_url(base_url: &str, url: &str) -> bool {
    let Some(object) = url.strip_prefix(&public_object_prefix(base_url)) else {
        return false;
    };

    let path = object.split(['?', '#']).next().unwrap_or_default();

    !path.is_empty()
        && !path.contains('\\')
        && path.split('/').all(|segment| {
            let segment = segment.to_ascii_lowercase().replace("%2e", ".");

            segment != "." && segment != ".."
        })
}

/// Turns an image reference from a backend row into an absolute URL.
///
/// Absolute URLs pass through untouched. Bare storage paths are resolved
/// against `base_url`, picking the bucket from the folder they live in, and
/// are left as they are when no base URL is known.
pub fn resolve_image_url(base_url: Option<&str>, reference: &str) -> String {
    if reference.contains("://") {
        return reference.to_string();
    }

    let Some(base_url) = base_url else {
        return reference.to_string();
    };

    let path = reference.trim_start_matches('/');
    let bucket = if path.starts_with(&format!("{PROFILE_IMAGE_FOLDER}/")) {
        PROFILE_IMAGE_BUCKET
    } else {
        POST_IMAGE_BUCKET
    };

    public_object_url(base_url, bucket, path)
}
