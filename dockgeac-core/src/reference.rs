//! Image reference normalisation.
//!
//! The runtime reports image references in several spellings (`nginx`,
//! `docker.io/library/nginx:latest`, digest-pinned). Equality testing goes
//! through an ordered candidate set so `nginx` and `docker.io/library/nginx`
//! compare as the same image.

/// Build the ordered candidate set for an image reference.
///
/// Candidates, deduplicated in order:
/// 1. the lowercased, trimmed reference;
/// 2. the same with any `@digest` suffix removed;
/// 3. the tail after a `docker.io/library/` prefix;
/// 4. the tail after a `docker.io/` prefix;
/// 5. `docker.io/library/<tail>` when the tail has no path separator;
/// 6. `docker.io/<tail>` when the first segment is not a registry host.
pub fn candidates(reference: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |candidate: String| {
        if !candidate.is_empty() && !out.contains(&candidate) {
            out.push(candidate);
        }
    };

    let base = reference.trim().to_lowercase();
    push(base.clone());

    let undigested = match base.split_once('@') {
        Some((name, _digest)) => name.to_string(),
        None => base.clone(),
    };
    push(undigested.clone());

    let tail = if let Some(t) = undigested.strip_prefix("docker.io/library/") {
        push(t.to_string());
        t.to_string()
    } else if let Some(t) = undigested.strip_prefix("docker.io/") {
        push(t.to_string());
        t.to_string()
    } else {
        undigested.clone()
    };

    if !tail.contains('/') {
        push(format!("docker.io/library/{}", tail));
    } else {
        let first = tail.split('/').next().unwrap_or("");
        if !first.contains('.') && !first.contains(':') && first != "localhost" {
            push(format!("docker.io/{}", tail));
        }
    }

    out
}

/// A reference is local-only when it is tagged `:local` or lives under the
/// `localhost/` registry. Local-only images are never pulled from a remote.
pub fn is_local_only(reference: &str) -> bool {
    let reference = reference.trim().to_lowercase();
    reference.ends_with(":local") || reference.starts_with("localhost/")
}

/// True when two references resolve to the same image under normalisation.
pub fn same_image(a: &str, b: &str) -> bool {
    let b_candidates = candidates(b);
    candidates(a).iter().any(|c| b_candidates.contains(c))
}
