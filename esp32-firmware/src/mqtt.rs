//! Mutually authenticated MQTT sessions over the ESP-IDF client.

use esp_idf_sys::*;
use fossor::event::SessionEvent;
use fossor::platform::{SecureTransport, TransportSession};
use fossor::session::{SessionError, SessionEventSink, SessionParams};
use std::ffi::CString;
use std::os::raw::{c_char, c_void};

fn c_string(what: &str, value: &str) -> Result<CString, SessionError> {
    CString::new(value).map_err(|_| SessionError::Construct(format!("{what} contains a NUL byte")))
}

pub struct EspTransport;

impl SecureTransport for EspTransport {
    fn open(&self, params: &SessionParams, events: SessionEventSink) -> Result<Box<dyn TransportSession>, SessionError> {
        let strings = [
            c_string("broker uri", &params.broker_uri)?,
            c_string("root certificate", &params.tls.ca_cert)?,
            c_string("client certificate", &params.tls.client_cert)?,
            c_string("private key", &params.tls.private_key)?,
        ];
        let [uri, ca, cert, key] = &strings;

        let mut cfg = esp_mqtt_client_config_t::default();
        cfg.broker.address.uri = uri.as_ptr();
        cfg.broker.address.port = params.port.into();
        cfg.broker.verification.certificate = ca.as_ptr();
        cfg.credentials.authentication.certificate = cert.as_ptr();
        cfg.credentials.authentication.key = key.as_ptr();

        let handle = unsafe { esp_mqtt_client_init(&cfg) };
        if handle.is_null() {
            return Err(SessionError::Construct("esp_mqtt_client_init returned null".into()));
        }

        // Owns everything the client points into; dropping it destroys the
        // client first.
        let session = EspMqttSession {
            handle,
            sink: Box::new(events),
            _strings: strings,
        };

        let arg = &*session.sink as *const SessionEventSink as *mut c_void;
        esp!(unsafe {
            esp_mqtt_client_register_event(handle, esp_mqtt_event_id_t_MQTT_EVENT_ANY, Some(mqtt_event_handler), arg)
        })
        .map_err(|e| SessionError::Construct(e.to_string()))?;

        Ok(Box::new(session))
    }
}

struct EspMqttSession {
    handle: esp_mqtt_client_handle_t,
    sink: Box<SessionEventSink>,
    _strings: [CString; 4],
}

// The client handle is only touched by the task that owns the session;
// the client's own event task only reaches the boxed sink.
unsafe impl Send for EspMqttSession {}

impl TransportSession for EspMqttSession {
    fn start(&mut self) -> Result<(), SessionError> {
        esp!(unsafe { esp_mqtt_client_start(self.handle) }).map_err(|e| SessionError::Start(e.to_string()))
    }

    fn enqueue(&mut self, topic: &str, payload: &[u8], qos: u8, retain: bool) -> Result<i32, SessionError> {
        let topic = CString::new(topic).map_err(|_| SessionError::Enqueue("topic contains a NUL byte".into()))?;
        let msg_id = unsafe {
            esp_mqtt_client_enqueue(
                self.handle,
                topic.as_ptr(),
                payload.as_ptr() as *const c_char,
                payload.len() as i32,
                qos.into(),
                retain.into(),
                true,
            )
        };
        if msg_id < 0 {
            return Err(SessionError::Enqueue(format!("msg_id={msg_id}")));
        }
        Ok(msg_id)
    }

    fn stop(&mut self) -> Result<(), SessionError> {
        esp!(unsafe { esp_mqtt_client_stop(self.handle) }).map_err(|e| SessionError::Stop(e.to_string()))
    }
}

impl Drop for EspMqttSession {
    fn drop(&mut self) {
        if let Err(e) = esp!(unsafe { esp_mqtt_client_destroy(self.handle) }) {
            warn!("mqtt: client not destroyed: {}", e);
        }
    }
}

unsafe fn describe_error(event: esp_mqtt_event_handle_t) -> String {
    let handle = (*event).error_handle;
    if handle.is_null() {
        return "no error details".into();
    }
    let codes = &*handle;
    format!(
        "type={} tls_err={} sock_errno={} connect_rc={}",
        codes.error_type, codes.esp_tls_last_esp_err, codes.esp_transport_sock_errno, codes.connect_return_code
    )
}

/// Callback for MQTT client events. `arg` is the session's boxed sink.
unsafe extern "C" fn mqtt_event_handler(
    arg: *mut c_void,
    _event_base: esp_event_base_t,
    event_id: i32,
    event_data: *mut c_void,
) {
    let Some(sink) = (arg as *const SessionEventSink).as_ref() else {
        return;
    };
    let event = event_data as esp_mqtt_event_handle_t;

    let session_event = match event_id {
        esp_mqtt_event_id_t_MQTT_EVENT_CONNECTED => SessionEvent::Connected,
        esp_mqtt_event_id_t_MQTT_EVENT_PUBLISHED if !event.is_null() => SessionEvent::Published {
            msg_id: (*event).msg_id,
        },
        esp_mqtt_event_id_t_MQTT_EVENT_DISCONNECTED => SessionEvent::Disconnected,
        esp_mqtt_event_id_t_MQTT_EVENT_ERROR => SessionEvent::ProtocolError {
            detail: if event.is_null() {
                "no error details".into()
            } else {
                describe_error(event)
            },
        },
        _ => return,
    };

    sink.dispatch(session_event);
}
