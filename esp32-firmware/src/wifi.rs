//! WiFi station driver and SmartConfig listener over the raw ESP-IDF API.
//!
//! Every driver event is translated into a [`NetworkEvent`] and handed to
//! the connectivity manager on the system event task.

use crate::MANAGER;
use esp_idf_svc::sys::EspError;
use esp_idf_sys::*;
use fossor::event::NetworkEvent;
use fossor::platform::{NetworkStack, PlatformError, ProvisioningListener};
use fossor_common::{Credentials, ProvisioningKind, ProvisioningPayload, RESERVED_DATA_LEN};
use std::net::Ipv4Addr;
use std::os::raw::c_void;
use std::ptr;

fn check(op: &'static str, code: esp_err_t) -> Result<(), PlatformError> {
    esp!(code).map_err(|e| PlatformError::new(op, e.to_string()))
}

/// Bring up NVS, the default event loop and the WiFi driver in station mode,
/// and route driver events to the connectivity manager. Does not start the
/// driver.
pub fn init() -> Result<(), EspError> {
    unsafe {
        info!("wifi: Initializing NVS");
        esp!(nvs_flash_init())?;

        info!("wifi: Initializing esp_netif");
        esp!(esp_netif_init())?;

        info!("wifi: Creating default event loop");
        esp!(esp_event_loop_create_default())?;

        let sta_netif = esp_netif_create_default_wifi_sta();
        if sta_netif.is_null() {
            error!("wifi: default STA netif not created");
            return Err(EspError::from_infallible::<ESP_FAIL>());
        }
    }

    let cfg = wifi_init_config_t {
        osi_funcs: &raw mut g_wifi_osi_funcs,
        wpa_crypto_funcs: unsafe { g_wifi_default_wpa_crypto_funcs },
        static_rx_buf_num: 10,
        dynamic_rx_buf_num: 32,
        tx_buf_type: 1,
        static_tx_buf_num: 0,
        dynamic_tx_buf_num: 32,
        cache_tx_buf_num: 0,
        csi_enable: 0,
        ampdu_rx_enable: 1,
        ampdu_tx_enable: 1,
        amsdu_tx_enable: 0,
        nvs_enable: 1,
        nano_enable: 0,
        rx_ba_win: 6,
        wifi_task_core_id: 0,
        beacon_max_len: 752,
        mgmt_sbuf_num: 32,
        feature_caps: WIFI_FEATURE_CAPS as u64,
        sta_disconnected_pm: false,
        espnow_max_encrypt_num: 7,
        magic: WIFI_INIT_CONFIG_MAGIC as i32,
        dump_hesigb_enable: false,
        rx_mgmt_buf_num: 32,
        rx_mgmt_buf_type: 0,
        tx_hetb_queue_num: 0,
    };

    unsafe {
        info!("wifi: Initializing WiFi");
        esp!(esp_wifi_init(&cfg))?;

        info!("wifi: Registering event handlers");
        esp!(esp_event_handler_register(
            WIFI_EVENT,
            ESP_EVENT_ANY_ID,
            Some(network_event_handler),
            ptr::null_mut()
        ))?;
        esp!(esp_event_handler_register(
            IP_EVENT,
            ip_event_t_IP_EVENT_STA_GOT_IP as i32,
            Some(network_event_handler),
            ptr::null_mut()
        ))?;
        esp!(esp_event_handler_register(
            SC_EVENT,
            ESP_EVENT_ANY_ID,
            Some(network_event_handler),
            ptr::null_mut()
        ))?;

        esp!(esp_wifi_set_mode(wifi_mode_t_WIFI_MODE_STA))?;
    }

    Ok(())
}

/// Start the driver. The resulting STA_START event kicks off association or
/// provisioning.
pub fn start() -> Result<(), EspError> {
    unsafe { esp!(esp_wifi_start()) }?;
    info!("wifi: WiFi started");
    Ok(())
}

/// The station interface and the SmartConfig listener.
pub struct EspRadio;

impl NetworkStack for EspRadio {
    fn stored_credentials(&self) -> Option<Credentials> {
        let mut conf: wifi_config_t = unsafe { std::mem::zeroed() };
        if let Err(e) = check("esp_wifi_get_config", unsafe {
            esp_wifi_get_config(wifi_interface_t_WIFI_IF_STA, &mut conf)
        }) {
            warn!("wifi: {}", e);
            return None;
        }
        let sta = unsafe { conf.sta };
        Some(Credentials::from_raw(
            sta.ssid,
            sta.password,
            sta.bssid_set.then_some(sta.bssid),
        ))
    }

    fn connect(&self) -> Result<(), PlatformError> {
        check("esp_wifi_connect", unsafe { esp_wifi_connect() })
    }

    fn disconnect(&self) -> Result<(), PlatformError> {
        check("esp_wifi_disconnect", unsafe { esp_wifi_disconnect() })
    }

    fn apply_credentials(&self, credentials: &Credentials) -> Result<(), PlatformError> {
        let mut conf: wifi_config_t = unsafe { std::mem::zeroed() };
        unsafe {
            conf.sta.ssid = *credentials.ssid();
            conf.sta.password = *credentials.password();
            if let Some(bssid) = credentials.bssid() {
                conf.sta.bssid_set = true;
                conf.sta.bssid = bssid;
            }
        }
        check("esp_wifi_set_config", unsafe {
            esp_wifi_set_config(wifi_interface_t_WIFI_IF_STA, &mut conf)
        })
    }
}

fn sc_type(kind: ProvisioningKind) -> smartconfig_type_t {
    match kind {
        ProvisioningKind::EspTouch => smartconfig_type_t_SC_TYPE_ESPTOUCH,
        ProvisioningKind::AirKiss => smartconfig_type_t_SC_TYPE_AIRKISS,
        ProvisioningKind::EspTouchAirKiss => smartconfig_type_t_SC_TYPE_ESPTOUCH_AIRKISS,
        ProvisioningKind::EspTouchV2 => smartconfig_type_t_SC_TYPE_ESPTOUCH_V2,
    }
}

fn provisioning_kind(raw: smartconfig_type_t) -> ProvisioningKind {
    match raw {
        smartconfig_type_t_SC_TYPE_AIRKISS => ProvisioningKind::AirKiss,
        smartconfig_type_t_SC_TYPE_ESPTOUCH_AIRKISS => ProvisioningKind::EspTouchAirKiss,
        smartconfig_type_t_SC_TYPE_ESPTOUCH_V2 => ProvisioningKind::EspTouchV2,
        _ => ProvisioningKind::EspTouch,
    }
}

impl ProvisioningListener for EspRadio {
    fn start(&self, kind: ProvisioningKind) -> Result<(), PlatformError> {
        check("esp_smartconfig_set_type", unsafe {
            esp_smartconfig_set_type(sc_type(kind))
        })?;
        let cfg = smartconfig_start_config_t {
            enable_log: false,
            esp_touch_v2_enable_crypt: false,
            esp_touch_v2_key: ptr::null_mut(),
        };
        check("esp_smartconfig_start", unsafe { esp_smartconfig_start(&cfg) })
    }

    fn stop(&self) -> Result<(), PlatformError> {
        check("esp_smartconfig_stop", unsafe { esp_smartconfig_stop() })
    }

    fn reserved_data(&self) -> Result<[u8; RESERVED_DATA_LEN], PlatformError> {
        let mut data = [0u8; RESERVED_DATA_LEN];
        check("esp_smartconfig_get_rvd_data", unsafe {
            esp_smartconfig_get_rvd_data(data.as_mut_ptr(), data.len() as u8)
        })?;
        Ok(data)
    }
}

fn dispatch(event: NetworkEvent) {
    match MANAGER.get() {
        Some(manager) => manager.handle(event),
        None => warn!("wifi: {:?} before the connectivity manager was installed", event),
    }
}

/// Event handler callback for WiFi, IP and SmartConfig events
unsafe extern "C" fn network_event_handler(
    _arg: *mut c_void,
    event_base: esp_event_base_t,
    event_id: i32,
    event_data: *mut c_void,
) {
    let event = if event_base == WIFI_EVENT {
        match event_id as u32 {
            wifi_event_t_WIFI_EVENT_STA_START => NetworkEvent::AssociationStarted,
            wifi_event_t_WIFI_EVENT_STA_DISCONNECTED => {
                let reason = if event_data.is_null() {
                    0
                } else {
                    (*(event_data as *const wifi_event_sta_disconnected_t)).reason as u8
                };
                NetworkEvent::Disconnected { reason }
            }
            _ => return,
        }
    } else if event_base == IP_EVENT {
        if event_id as u32 != ip_event_t_IP_EVENT_STA_GOT_IP || event_data.is_null() {
            return;
        }
        let got_ip = &*(event_data as *const ip_event_got_ip_t);
        NetworkEvent::AddressAcquired {
            ip: Ipv4Addr::from(got_ip.ip_info.ip.addr.to_le_bytes()),
        }
    } else if event_base == SC_EVENT {
        match event_id as u32 {
            smartconfig_event_t_SC_EVENT_SCAN_DONE => NetworkEvent::ProvisioningScanDone,
            smartconfig_event_t_SC_EVENT_FOUND_CHANNEL => NetworkEvent::ProvisioningChannelFound,
            smartconfig_event_t_SC_EVENT_GOT_SSID_PSWD => {
                if event_data.is_null() {
                    return;
                }
                let evt = &*(event_data as *const smartconfig_event_got_ssid_pswd_t);
                NetworkEvent::ProvisioningCredentialsFound(ProvisioningPayload {
                    kind: provisioning_kind(evt.type_),
                    ssid: evt.ssid,
                    password: evt.password,
                    bssid_set: evt.bssid_set,
                    bssid: evt.bssid,
                })
            }
            smartconfig_event_t_SC_EVENT_SEND_ACK_DONE => NetworkEvent::ProvisioningAckSent,
            _ => return,
        }
    } else {
        return;
    };

    dispatch(event);
}
