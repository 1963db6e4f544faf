use pbench_core::api::ClientError;

const BODY_PREVIEW_LIMIT: usize = 512;

pub(crate) fn from_reqwest(err: reqwest::Error, url: &str) -> ClientError {
    let kind = if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connect"
    } else if err.is_request() {
        "request"
    } else if err.is_body() {
        "body"
    } else if err.is_decode() {
        "decode"
    } else {
        "unknown"
    };
    ClientError::Transport(format!("{kind} error url={url}: {err}"))
}

pub(crate) fn status_error(status: u16, url: &str, body: &str) -> ClientError {
    ClientError::Status {
        status,
        url: url.to_string(),
        body: preview_body(body),
    }
}

pub(crate) fn decode_error(url: &str, err: serde_json::Error, body: &[u8]) -> ClientError {
    ClientError::Decode(format!(
        "failed to decode response body from {}: {} | body={}",
        url,
        err,
        preview_body(&String::from_utf8_lossy(body))
    ))
}

pub(crate) fn preview_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }

    let mut out = String::new();
    let mut truncated = false;
    for (idx, ch) in trimmed.chars().enumerate() {
        if idx >= BODY_PREVIEW_LIMIT {
            truncated = true;
            break;
        }
        out.push(ch);
    }

    if truncated {
        out.push_str("...");
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_of_blank_body() {
        assert_eq!(preview_body("   "), "<empty body>");
    }

    #[test]
    fn preview_truncates_long_bodies() {
        let body = "a".repeat(BODY_PREVIEW_LIMIT + 10);
        let preview = preview_body(&body);
        assert!(preview.ends_with("..."));
        assert!(preview.len() <= BODY_PREVIEW_LIMIT + 3);
    }

    #[test]
    fn status_error_carries_preview() {
        let err = status_error(502, "http://coordinator/v1/statement", " bad gateway \n");
        assert_eq!(
            err.to_string(),
            "http status 502 from http://coordinator/v1/statement: bad gateway"
        );
    }
}
