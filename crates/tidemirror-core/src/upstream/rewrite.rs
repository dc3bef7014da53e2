//! Mapping URLs from one mirror's base onto another's.

use percent_encoding::{percent_decode_str, utf8_percent_encode};
use tidemirror_types::Target;
use url::Url;

use super::proxy_decider::URI_COMPONENT;

const QUALITY_PARAM: &str = "quality";

/// Strip `base_path` from the front of `url_path`.
///
/// The prefix must end on a segment boundary (`/base` is not a prefix of
/// `/basement`). When it is not a prefix the path is returned unchanged.
pub fn relative_path(url_path: &str, base_path: &str) -> String {
    let base = base_path.trim_end_matches('/');
    if base.is_empty() {
        return url_path.to_string();
    }
    match url_path.strip_prefix(base) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.to_string(),
        _ => url_path.to_string(),
    }
}

/// Join a mirror base path with a relative path using exactly one separating slash.
pub fn combine(base_path: &str, relative: &str) -> String {
    let base = base_path.trim_end_matches('/');
    if relative.is_empty() {
        return if base.is_empty() { "/".to_string() } else { base.to_string() };
    }
    let relative = relative.strip_prefix('/').unwrap_or(relative);
    format!("{}/{}", base, relative)
}

/// Re-root `url` from `from`'s base onto `to`'s base, keeping query and fragment.
///
/// When the mirrors speak different protocol versions and a quality hint is
/// given, an existing `quality` query parameter is overwritten with the hint.
pub fn rewrite(url: &Url, from: &Target, to: &Target, preferred_quality: Option<&str>) -> Url {
    let relative = relative_path(url.path(), from.base_path());

    let mut rewritten = to.base_url.clone();
    rewritten.set_path(&combine(to.base_path(), &relative));
    rewritten.set_query(url.query());
    rewritten.set_fragment(url.fragment());

    if let Some(quality) = preferred_quality {
        if from.version != to.version {
            override_quality(&mut rewritten, quality);
        }
    }
    rewritten
}

/// Replace the value of every `quality` pair in place. Other segments keep
/// their exact encoding.
fn override_quality(url: &mut Url, quality: &str) {
    let Some(query) = url.query() else {
        return;
    };
    let mut replaced = false;
    let segments: Vec<String> = query
        .split('&')
        .map(|segment| {
            let key = segment.split_once('=').map_or(segment, |(key, _)| key);
            if is_quality_key(key) {
                replaced = true;
                format!("{}={}", key, utf8_percent_encode(quality, URI_COMPONENT))
            } else {
                segment.to_string()
            }
        })
        .collect();
    if replaced {
        url.set_query(Some(&segments.join("&")));
    }
}

fn is_quality_key(raw: &str) -> bool {
    let key = raw.replace('+', " ");
    percent_decode_str(&key).decode_utf8().is_ok_and(|key| key == QUALITY_PARAM)
}
