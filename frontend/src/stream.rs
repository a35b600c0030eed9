use chat_protocol::{decode_line, LineBuffer, StreamEvent};
use js_sys::{Reflect, Uint8Array};
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{ReadableStream, ReadableStreamDefaultReader};

fn js_error(value: JsValue) -> String {
    value
        .as_string()
        .or_else(|| {
            Reflect::get(&value, &JsValue::from_str("message"))
                .ok()
                .and_then(|m| m.as_string())
        })
        .unwrap_or_else(|| "Stream read failed".to_string())
}

/// Reads relay events from `body` into `on_event` until the body ends or
/// the callback returns `false`. Malformed frames are logged and skipped.
///
/// An aborted request surfaces here as an `Err`.
pub async fn read_events(
    body: ReadableStream,
    mut on_event: impl FnMut(StreamEvent) -> bool,
) -> Result<(), String> {
    let reader: ReadableStreamDefaultReader = body.get_reader().unchecked_into();
    let mut lines = LineBuffer::new();

    loop {
        let chunk = JsFuture::from(reader.read()).await.map_err(js_error)?;
        let done = Reflect::get(&chunk, &JsValue::from_str("done"))
            .map_err(js_error)?
            .as_bool()
            .unwrap_or(true);

        let decoded: Vec<String> = if done {
            lines.finish().into_iter().collect()
        } else {
            let value = Reflect::get(&chunk, &JsValue::from_str("value")).map_err(js_error)?;
            lines.push(&Uint8Array::new(&value).to_vec())
        };

        for line in decoded {
            let event = match decode_line(&line) {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(e) => {
                    log::warn!("Skipping malformed stream frame: {e}");
                    continue;
                }
            };
            if !on_event(event) {
                let _ = reader.cancel();
                return Ok(());
            }
        }

        if done {
            return Ok(());
        }
    }
}
