//! FFI interface for C/C++ callers
//!
//! Definitions go in and results come out as JSON strings. Every returned
//! [`ExtractionResultFFI`] must be released with `free_extraction_result`.

use std::ffi::{c_char, CStr, CString};
use std::ptr;

use serde::{Deserialize, Serialize};

use crate::coordinator::{StrategyCoordinator, StrategySpec};
use crate::extractors::{ExtractionStrategy, Page, PatternExtractor, PatternInput, SchemaExtractor};
use crate::patterns::PatternSetDefinition;

/// Result struct returned to C
/// Both pointers are owned by Rust and must be freed via free_extraction_result
#[repr(C)]
pub struct ExtractionResultFFI {
    /// JSON-serialized result (null-terminated)
    pub json_ptr: *mut c_char,
    /// Error message if extraction failed (null-terminated), or null on success
    pub error_ptr: *mut c_char,
}

/// Pattern set plus the text it should scan
#[derive(Deserialize)]
struct PatternRequestFFI {
    #[serde(flatten)]
    patterns: PatternSetDefinition,
    #[serde(default)]
    input: PatternInput,
}

/// Extract records from HTML with a schema.
///
/// # Arguments
/// * `html_ptr` - Pointer to HTML content (UTF-8, not necessarily null-terminated)
/// * `html_len` - Length of HTML content in bytes
/// * `schema_json` - JSON-serialized schema definition (null-terminated)
///
/// # Returns
/// JSON array of records, or error_ptr set if the schema is invalid
///
/// # Safety
/// - `html_ptr` must point to valid memory of at least `html_len` bytes
/// - `schema_json` must be a valid null-terminated C string
/// - Caller must free the result via `free_extraction_result`
#[no_mangle]
pub unsafe extern "C" fn extract_schema_ffi(
    html_ptr: *const c_char,
    html_len: usize,
    schema_json: *const c_char,
) -> ExtractionResultFFI {
    let html = match read_html(html_ptr, html_len) {
        Ok(html) => html,
        Err(result) => return result,
    };
    let schema_str = match read_cstr(schema_json, "schema JSON") {
        Ok(s) => s,
        Err(result) => return result,
    };

    let extractor = match SchemaExtractor::from_json(schema_str) {
        Ok(extractor) => extractor,
        Err(e) => return make_error_result(&e.to_string()),
    };

    make_json_result(&extractor.extract_html(html))
}

/// Extract labeled pattern matches from HTML.
///
/// `patterns_json` is `{"builtins": [...], "custom": {"Label": "regex"}, "input": "text" | "html"}`.
///
/// # Safety
/// Same as extract_schema_ffi
#[no_mangle]
pub unsafe extern "C" fn extract_patterns_ffi(
    html_ptr: *const c_char,
    html_len: usize,
    patterns_json: *const c_char,
) -> ExtractionResultFFI {
    let html = match read_html(html_ptr, html_len) {
        Ok(html) => html,
        Err(result) => return result,
    };
    let patterns_str = match read_cstr(patterns_json, "patterns JSON") {
        Ok(s) => s,
        Err(result) => return result,
    };

    let request: PatternRequestFFI = match serde_json::from_str(patterns_str) {
        Ok(r) => r,
        Err(e) => return make_error_result(&format!("Failed to parse patterns JSON: {}", e)),
    };
    let extractor = match PatternExtractor::new("patterns", request.patterns) {
        Ok(extractor) => extractor.with_input(request.input),
        Err(e) => return make_error_result(&e.to_string()),
    };

    match extractor.extract(&Page::parse(html)) {
        Ok(items) => make_json_result(&items),
        Err(e) => make_error_result(&e.to_string()),
    }
}

/// Run a strategy chain over HTML.
///
/// `chain_json` is a JSON array of strategy specs, e.g.
/// `[{"kind": "schema", "schema": {...}}, {"kind": "patterns", "patterns": {...}}]`.
/// The result is the outcome object; exhausting the chain is reported there,
/// not through error_ptr.
///
/// # Safety
/// Same as extract_schema_ffi
#[no_mangle]
pub unsafe extern "C" fn extract_with_fallback_ffi(
    html_ptr: *const c_char,
    html_len: usize,
    chain_json: *const c_char,
) -> ExtractionResultFFI {
    let html = match read_html(html_ptr, html_len) {
        Ok(html) => html,
        Err(result) => return result,
    };
    let chain_str = match read_cstr(chain_json, "chain JSON") {
        Ok(s) => s,
        Err(result) => return result,
    };

    let specs: Vec<StrategySpec> = match serde_json::from_str(chain_str) {
        Ok(specs) => specs,
        Err(e) => return make_error_result(&format!("Failed to parse chain JSON: {}", e)),
    };
    let coordinator = match StrategyCoordinator::from_specs(&specs) {
        Ok(coordinator) => coordinator,
        Err(e) => return make_error_result(&e.to_string()),
    };

    make_json_result(&coordinator.run_html(html))
}

/// Install the tracing subscriber; returns false if one was already set
#[no_mangle]
pub extern "C" fn structured_extract_init_logging() -> bool {
    crate::telemetry::init_telemetry().is_ok()
}

/// Free an ExtractionResultFFI returned by any function in this module
///
/// # Safety
/// - `result` must have been returned by one of the `*_ffi` functions
/// - Must only be called once per result
#[no_mangle]
pub unsafe extern "C" fn free_extraction_result(result: ExtractionResultFFI) {
    if !result.json_ptr.is_null() {
        drop(CString::from_raw(result.json_ptr));
    }
    if !result.error_ptr.is_null() {
        drop(CString::from_raw(result.error_ptr));
    }
}

unsafe fn read_html<'a>(html_ptr: *const c_char, html_len: usize) -> Result<&'a str, ExtractionResultFFI> {
    if html_ptr.is_null() || html_len == 0 {
        return Ok("");
    }
    let slice = std::slice::from_raw_parts(html_ptr as *const u8, html_len);
    std::str::from_utf8(slice).map_err(|_| make_error_result("Invalid UTF-8 in HTML content"))
}

unsafe fn read_cstr<'a>(ptr: *const c_char, what: &str) -> Result<&'a str, ExtractionResultFFI> {
    if ptr.is_null() {
        return Err(make_error_result(&format!("{} is null", what)));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| make_error_result(&format!("Invalid UTF-8 in {}", what)))
}

fn make_json_result<T: Serialize>(value: &T) -> ExtractionResultFFI {
    match serde_json::to_string(value) {
        Ok(json) => match CString::new(json) {
            Ok(cstr) => ExtractionResultFFI {
                json_ptr: cstr.into_raw(),
                error_ptr: ptr::null_mut(),
            },
            Err(_) => make_error_result("Result JSON contains null bytes"),
        },
        Err(e) => make_error_result(&format!("Failed to serialize result: {}", e)),
    }
}

// Helper to create error result
fn make_error_result(msg: &str) -> ExtractionResultFFI {
    let error_cstr = CString::new(msg.replace('\0', " ")).unwrap_or_default();
    ExtractionResultFFI {
        json_ptr: ptr::null_mut(),
        error_ptr: error_cstr.into_raw(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    const HTML: &str = r#"<ul>
        <li class="job"><h3>Engineer</h3><a href="/jobs/1">apply</a></li>
        <li class="job"><h3>Designer</h3><a href="/jobs/2">apply</a></li>
    </ul><p>Questions: jobs@corp.example</p>"#;

    /// Call an FFI function and hand back (json, error), freeing the result
    fn call(
        f: unsafe extern "C" fn(*const c_char, usize, *const c_char) -> ExtractionResultFFI,
        html: &str,
        request: &str,
    ) -> (Option<Value>, Option<String>) {
        let request = CString::new(request).unwrap();
        unsafe {
            let result = f(html.as_ptr() as *const c_char, html.len(), request.as_ptr());
            let json = (!result.json_ptr.is_null())
                .then(|| serde_json::from_str(CStr::from_ptr(result.json_ptr).to_str().unwrap()).unwrap());
            let error = (!result.error_ptr.is_null())
                .then(|| CStr::from_ptr(result.error_ptr).to_string_lossy().into_owned());
            free_extraction_result(result);
            (json, error)
        }
    }

    fn jobs_schema() -> Value {
        json!({
            "name": "Jobs",
            "baseSelector": "li.job",
            "fields": [
                {"name": "title", "selector": "h3", "type": "text"},
                {"name": "link", "selector": "a", "type": "attribute", "attribute": "href"}
            ]
        })
    }

    #[test]
    fn test_extract_schema_ffi() {
        let (json, error) = call(extract_schema_ffi, HTML, &jobs_schema().to_string());
        assert!(error.is_none());
        assert_eq!(
            json.unwrap(),
            json!([
                {"title": "Engineer", "link": "/jobs/1"},
                {"title": "Designer", "link": "/jobs/2"}
            ])
        );
    }

    #[test]
    fn test_extract_schema_ffi_rejects_bad_schema() {
        let bad = json!({"name": "x", "baseSelector": "li[", "fields": []}).to_string();
        let (json, error) = call(extract_schema_ffi, HTML, &bad);
        assert!(json.is_none());
        assert!(error.unwrap().contains("invalid selector"));

        let (json, error) = call(extract_schema_ffi, HTML, "not json");
        assert!(json.is_none());
        assert!(error.is_some());
    }

    #[test]
    fn test_extract_patterns_ffi() {
        let request = json!({"builtins": ["Email"], "input": "html"}).to_string();
        let (json, error) = call(extract_patterns_ffi, HTML, &request);
        assert!(error.is_none());
        let items = json.unwrap();
        assert_eq!(items[0]["label"], "Email");
        assert_eq!(items[0]["value"], "jobs@corp.example");
    }

    #[test]
    fn test_extract_with_fallback_ffi() {
        let chain = json!([
            {"kind": "schema", "schema": {
                "name": "Products",
                "baseSelector": "div.product",
                "fields": [{"name": "name", "selector": "h2", "type": "text"}]
            }},
            {"kind": "patterns", "name": "contacts", "patterns": {"builtins": ["Email"]}}
        ])
        .to_string();

        let (json, error) = call(extract_with_fallback_ffi, HTML, &chain);
        assert!(error.is_none());
        let outcome = json.unwrap();
        assert_eq!(outcome["outcome"], "extracted");
        assert_eq!(outcome["strategy"], "contacts");
        assert_eq!(outcome["skipped"][0]["status"], "empty");
        assert_eq!(outcome["items"][0]["value"], "jobs@corp.example");
    }

    #[test]
    fn test_invalid_utf8_html() {
        let bytes = [0xffu8, 0xfe];
        let request = CString::new(jobs_schema().to_string()).unwrap();
        unsafe {
            let result = extract_schema_ffi(bytes.as_ptr() as *const c_char, bytes.len(), request.as_ptr());
            assert!(result.json_ptr.is_null());
            assert!(!result.error_ptr.is_null());
            free_extraction_result(result);
        }
    }

    #[test]
    fn test_null_request() {
        unsafe {
            let result = extract_with_fallback_ffi(ptr::null(), 0, ptr::null());
            assert!(result.json_ptr.is_null());
            assert_eq!(CStr::from_ptr(result.error_ptr).to_str().unwrap(), "chain JSON is null");
            free_extraction_result(result);
        }
    }
}
