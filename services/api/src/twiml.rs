//! TwiML call-control documents.

/// Path the telephony provider streams call audio to.
pub const MEDIA_STREAM_PATH: &str = "/media-stream";

/// Escapes text for use in XML content and attribute values.
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// The websocket URL of the media stream endpoint.
///
/// `public_url` wins over the request's `Host` header so the URL survives
/// reverse proxies and tunnels.
pub fn media_stream_url(public_url: Option<&str>, host: Option<&str>) -> Option<String> {
    let host = match public_url {
        Some(url) => url
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/'),
        None => host?,
    };
    if host.is_empty() {
        return None;
    }
    Some(format!("wss://{}{}", host, MEDIA_STREAM_PATH))
}

/// Speaks `intro`, pauses, then connects the call audio to `stream_url`.
///
/// The caller's number travels as a stream parameter and comes back in the
/// media stream's `start` event.
pub fn connect_stream(intro: &str, stream_url: &str, caller: Option<&str>) -> String {
    let parameter = caller
        .map(|caller| format!(r#"<Parameter name="caller" value="{}"/>"#, escape(caller)))
        .unwrap_or_default();
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            "<Response>",
            "<Say>{intro}</Say>",
            r#"<Pause length="1"/>"#,
            r#"<Connect><Stream url="{url}">{parameter}</Stream></Connect>"#,
            "</Response>"
        ),
        intro = escape(intro),
        url = escape(stream_url),
        parameter = parameter,
    )
}
