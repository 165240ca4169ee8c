use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use chrono::{Datelike, Utc};
use dht_sensor::dht22;
use embedded_svc::{
    mqtt::client::{Details, EventPayload, QoS},
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::{
    adc::{
        attenuation::DB_11,
        oneshot::{config::AdcChannelConfig, AdcChannelDriver, AdcDriver},
        ADC1,
    },
    delay::Ets,
    gpio::{AnyIOPin, AnyInputPin, Gpio36, IOPin, Input, InputOutput, InputPin, Output, PinDriver, Pull},
    ledc::{config::TimerConfig, LedcDriver, LedcTimerDriver},
    units::FromValueType,
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{modem::Modem, prelude::Peripherals},
    log::EspLogger,
    mqtt::client::{EspMqttClient, EspMqttConnection, MqttClientConfiguration},
    nvs::{EspDefaultNvsPartition, EspNvs},
    sntp::EspSntp,
    wifi::{BlockingWifi, EspWifi},
};
use log::{debug, info, warn};

use medibox_common::{
    apply_config_message, evaluate_environment, vent_angle, Alarms, Button, ClockState,
    ControlParams, DeviceStatePayload, MenuMachine, RingSequence, RuntimeConfig,
    SamplingAggregator, Tone, UtcOffset, WarningSiren, CONFIG_TOPICS, TOPIC_DEVICE_STATUS,
    TOPIC_LIGHT_AVERAGE, TOPIC_TEMPERATURE_AVERAGE,
};

const NVS_NAMESPACE: &str = "medibox";
const NVS_RUNTIME_KEY: &str = "runtime_json";
const MAX_MQTT_PAYLOAD_BYTES: usize = 512;
const WATCHDOG_TIMEOUT_SEC: u32 = 30;
const WIFI_CONNECT_ATTEMPTS: u32 = 5;
const WIFI_RETRY_DELAY_MS: u64 = 3_000;
const MQTT_RETRY_DELAY_MS: u64 = 5_000;
const TICK_MS: u64 = 50;
const BUTTON_DEBOUNCE_MS: u64 = 200;

// Servo pulse width bounds at 50 Hz.
const SERVO_MIN_US: u32 = 500;
const SERVO_MAX_US: u32 = 2_500;

#[derive(Debug)]
struct Inbound {
    topic: String,
    payload: String,
}

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    let mut runtime = load_runtime_config(&nvs_partition).unwrap_or_else(|err| {
        warn!("failed to load runtime config from NVS: {err:#}");
        RuntimeConfig::default()
    });
    runtime.sanitize();

    let peripherals = Peripherals::take()?;
    let pins = peripherals.pins;

    let wifi = connect_wifi(peripherals.modem, sys_loop, nvs_partition, &runtime.network)
        .context("wifi startup failed")?;
    disable_wifi_power_save();

    let _sntp = EspSntp::new_default().context("failed to start SNTP")?;
    info!("SNTP initialized");

    init_watchdog(WATCHDOG_TIMEOUT_SEC)?;

    // GPIO34 and GPIO35 are input-only, so the pad works on AnyInputPin.
    let buttons = ButtonPad::new(
        pins.gpio33.downgrade_input(),
        pins.gpio35.downgrade_input(),
        pins.gpio32.downgrade_input(),
        pins.gpio34.downgrade_input(),
    )?;

    let mut dht_pin = PinDriver::input_output_od(pins.gpio12.downgrade())?;
    dht_pin.set_pull(Pull::Up)?;
    dht_pin.set_high()?;

    // The channel driver borrows the unit driver, so the unit lives for
    // the program lifetime.
    let adc: &'static AdcDriver<'static, ADC1> = Box::leak(Box::new(AdcDriver::new(peripherals.adc1)?));
    let ldr = AdcChannelDriver::new(
        adc,
        pins.gpio36,
        &AdcChannelConfig {
            attenuation: DB_11,
            ..Default::default()
        },
    )?;

    let servo_timer: &'static LedcTimerDriver<'static> = Box::leak(Box::new(LedcTimerDriver::new(
        peripherals.ledc.timer0,
        &TimerConfig::default().frequency(50.Hz()),
    )?));
    let servo = LedcDriver::new(peripherals.ledc.channel0, servo_timer, pins.gpio14)?;

    let buzzer = PinDriver::output(pins.gpio5.downgrade())?;
    let indicator = PinDriver::output(pins.gpio18.downgrade())?;

    let mqtt_connected = Arc::new(AtomicBool::new(false));
    let (config_tx, config_rx) = mpsc::channel();
    let (mqtt, mqtt_conn) = create_mqtt_client(&runtime.network)?;
    let mqtt = Arc::new(Mutex::new(mqtt));
    spawn_mqtt_receiver(mqtt_conn, mqtt.clone(), config_tx, mqtt_connected.clone());
    if let Err(err) = subscribe_topics(&mqtt) {
        warn!("initial config subscribe failed, receiver will retry: {err:#}");
    }

    // Keep wifi alive for the program lifetime.
    let _wifi = wifi;

    let device = EspDeviceLoop::new(
        runtime,
        mqtt,
        mqtt_connected,
        config_rx,
        buttons,
        Sensors { dht_pin, adc, ldr },
        Outputs {
            servo,
            buzzer,
            indicator,
        },
    );
    device.run()
}

struct Sensors {
    dht_pin: PinDriver<'static, AnyIOPin, InputOutput>,
    adc: &'static AdcDriver<'static, ADC1>,
    ldr: AdcChannelDriver<'static, Gpio36, &'static AdcDriver<'static, ADC1>>,
}

impl Sensors {
    fn read_light_level(&mut self) -> Option<i64> {
        match self.adc.read(&mut self.ldr) {
            Ok(raw) => Some(i64::from(raw)),
            Err(err) => {
                warn!("LDR read failed: {err:?}");
                None
            }
        }
    }

    fn read_environment(&mut self) -> Option<(f32, f32)> {
        if let Err(err) = self.dht_pin.set_high() {
            warn!("failed to raise DHT22 line before read: {err:?}");
            return None;
        }
        let mut delay = Ets;
        match dht22::blocking::read(&mut delay, &mut self.dht_pin) {
            Ok(reading) => Some((reading.temperature, reading.relative_humidity)),
            Err(err) => {
                warn!("DHT22 read failed: {err:?}");
                None
            }
        }
    }
}

struct Outputs {
    servo: LedcDriver<'static>,
    buzzer: PinDriver<'static, AnyIOPin, Output>,
    indicator: PinDriver<'static, AnyIOPin, Output>,
}

impl Outputs {
    fn set_vent_angle(&mut self, angle: u8) {
        let span = SERVO_MAX_US - SERVO_MIN_US;
        let pulse_us = SERVO_MIN_US + span * u32::from(angle) / 180;
        // 50 Hz -> 20_000 us period.
        let duty = self.servo.get_max_duty() * pulse_us / 20_000;
        if let Err(err) = self.servo.set_duty(duty) {
            warn!("servo duty update failed: {err:?}");
        }
    }

    /// Bit-banged square wave; the buzzer has no dedicated tone peripheral.
    fn play_tone(&mut self, tone: Tone) {
        let half_period_us = 500_000 / u32::from(tone.frequency_hz);
        let cycles = u64::from(tone.frequency_hz) * tone.duration_ms / 1_000;
        for _ in 0..cycles {
            let _ = self.buzzer.set_high();
            Ets::delay_us(half_period_us);
            let _ = self.buzzer.set_low();
            Ets::delay_us(half_period_us);
        }
    }

    fn set_indicator(&mut self, on: bool) {
        let result = if on {
            self.indicator.set_high()
        } else {
            self.indicator.set_low()
        };
        if let Err(err) = result {
            warn!("indicator update failed: {err:?}");
        }
    }
}

/// Four active-low inputs; a press is reported once per edge after the
/// debounce interval.
struct ButtonPad {
    up: PinDriver<'static, AnyInputPin, Input>,
    down: PinDriver<'static, AnyInputPin, Input>,
    ok: PinDriver<'static, AnyInputPin, Input>,
    cancel: PinDriver<'static, AnyInputPin, Input>,
    last_press: Option<Instant>,
}

impl ButtonPad {
    fn new(
        up: AnyInputPin,
        down: AnyInputPin,
        ok: AnyInputPin,
        cancel: AnyInputPin,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            up: PinDriver::input(up)?,
            down: PinDriver::input(down)?,
            ok: PinDriver::input(ok)?,
            cancel: PinDriver::input(cancel)?,
            last_press: None,
        })
    }

    fn poll(&mut self) -> Option<Button> {
        if let Some(last) = self.last_press {
            if last.elapsed() < Duration::from_millis(BUTTON_DEBOUNCE_MS) {
                return None;
            }
        }

        let pressed = if self.up.is_low() {
            Button::Up
        } else if self.down.is_low() {
            Button::Down
        } else if self.ok.is_low() {
            Button::Ok
        } else if self.cancel.is_low() {
            Button::Cancel
        } else {
            return None;
        };

        self.last_press = Some(Instant::now());
        Some(pressed)
    }
}

struct EspDeviceLoop {
    clock: ClockState,
    clock_valid: bool,
    alarms: Alarms,
    menu: MenuMachine,
    params: ControlParams,
    light_agg: SamplingAggregator,
    temp_agg: SamplingAggregator,
    mqtt: Arc<Mutex<EspMqttClient<'static>>>,
    mqtt_connected: Arc<AtomicBool>,
    config_rx: mpsc::Receiver<Inbound>,
    buttons: ButtonPad,
    sensors: Sensors,
    outputs: Outputs,
    vent_angle: u8,
    warning_active: bool,
    last_environment: Option<(f32, f32)>,
}

impl EspDeviceLoop {
    #[allow(clippy::too_many_arguments)]
    fn new(
        runtime: RuntimeConfig,
        mqtt: Arc<Mutex<EspMqttClient<'static>>>,
        mqtt_connected: Arc<AtomicBool>,
        config_rx: mpsc::Receiver<Inbound>,
        buttons: ButtonPad,
        sensors: Sensors,
        outputs: Outputs,
    ) -> Self {
        let now_ms = monotonic_ms();
        let params = runtime.params.clone();

        let mut clock = ClockState::default();
        clock.utc_offset = UtcOffset::from_minutes(runtime.utc_offset_minutes);

        Self {
            clock,
            clock_valid: false,
            alarms: Alarms::with_capacity(runtime.alarm_capacity),
            menu: MenuMachine::new(runtime.alarm_capacity),
            light_agg: SamplingAggregator::new(
                params.sampling_interval_ms,
                params.publish_interval_ms,
                now_ms,
            ),
            temp_agg: SamplingAggregator::new(
                params.sampling_interval_ms,
                params.publish_interval_ms,
                now_ms,
            ),
            params,
            mqtt,
            mqtt_connected,
            config_rx,
            buttons,
            sensors,
            outputs,
            vent_angle: 0,
            warning_active: false,
            last_environment: None,
        }
    }

    fn run(mut self) -> anyhow::Result<()> {
        if let Ok(mut mqtt) = self.mqtt.lock() {
            if let Err(err) = mqtt.enqueue(TOPIC_DEVICE_STATUS, QoS::AtLeastOnce, true, b"online") {
                warn!("online announcement failed: {err:?}");
            }
        }
        info!("medibox control loop started");

        loop {
            feed_watchdog();
            self.service_background();

            if self.clock_valid {
                let reading = self.clock.reading;
                if let Some(index) = self.alarms.due(reading.hour, reading.minute) {
                    self.alarms.fire(index)?;
                    self.ring_session(index)?;
                }
            }

            if let Some(button) = self.buttons.poll() {
                let effects = self.menu.handle(button, &mut self.alarms, &mut self.clock);
                for effect in effects {
                    info!("menu: {effect:?}");
                }
                for line in self.menu.render(&self.alarms) {
                    info!("display: {line}");
                }
            }

            if let Some((temperature, humidity)) = self.last_environment {
                let status = evaluate_environment(temperature, humidity);
                for line in &status.status_lines {
                    debug!("display: {line}");
                }
                if status.active() {
                    self.warning_session();
                } else if self.warning_active {
                    self.warning_active = false;
                    self.outputs.set_indicator(false);
                }
            }

            let angle = vent_angle(&self.params, self.temp_agg.current_average());
            if angle != self.vent_angle {
                self.vent_angle = angle;
                info!("vent angle: {angle}");
            }
            self.outputs.set_vent_angle(self.vent_angle);

            thread::sleep(Duration::from_millis(TICK_MS));
        }
    }

    /// Background duties re-entered from every suspension point.
    fn service_background(&mut self) {
        self.refresh_clock();
        self.drain_config();
        self.run_samplers();
    }

    fn refresh_clock(&mut self) {
        let now = Utc::now();
        // Before the first SNTP sync the RTC reports the epoch; treat that
        // as a recoverable failure and retry next tick.
        if now.year() < 2023 {
            if self.clock_valid {
                warn!("wall clock lost; waiting for SNTP");
            }
            self.clock_valid = false;
            return;
        }
        self.clock.refresh(now);
        self.clock_valid = true;
    }

    fn drain_config(&mut self) {
        while let Ok(message) = self.config_rx.try_recv() {
            match apply_config_message(&message.topic, &message.payload, &mut self.params) {
                Some(change) => {
                    info!("config update {:?} from {}", change, message.topic);
                    if change.resets_sampling_windows() {
                        let now_ms = monotonic_ms();
                        for agg in [&mut self.light_agg, &mut self.temp_agg] {
                            agg.set_intervals(
                                self.params.sampling_interval_ms,
                                self.params.publish_interval_ms,
                            );
                            agg.reset_window(now_ms);
                        }
                    }
                }
                None => debug!(
                    "dropped config payload `{}` on {}",
                    message.payload, message.topic
                ),
            }
        }
    }

    fn run_samplers(&mut self) {
        let now_ms = monotonic_ms();

        if self.light_agg.sample_due(now_ms) {
            if let Some(level) = self.sensors.read_light_level() {
                debug!("light reading: {level}");
                self.light_agg.record_sample(now_ms, level);
            }
        }
        if self.temp_agg.sample_due(now_ms) {
            if let Some((temperature, humidity)) = self.sensors.read_environment() {
                debug!("temperature reading: {temperature:.1}");
                self.temp_agg.record_sample(now_ms, temperature as i64);
                self.last_environment = Some((temperature, humidity));
            }
        }

        if !self.mqtt_connected.load(Ordering::Relaxed) {
            return;
        }

        if let Some(average) = self.light_agg.try_publish(now_ms) {
            self.publish(TOPIC_LIGHT_AVERAGE, average.to_string());
        }
        if let Some(average) = self.temp_agg.try_publish(now_ms) {
            self.publish(TOPIC_TEMPERATURE_AVERAGE, average.to_string());

            let state = DeviceStatePayload {
                light_average: self.light_agg.current_average(),
                temperature_average: average,
                vent_angle: self.vent_angle,
                warning_active: self.warning_active,
            };
            match serde_json::to_string(&state) {
                Ok(body) => self.publish(TOPIC_DEVICE_STATUS, body),
                Err(err) => warn!("device state serialization failed: {err}"),
            }
        }
    }

    fn publish(&self, topic: &str, payload: String) {
        let Ok(mut mqtt) = self.mqtt.lock() else {
            warn!("mqtt client lock poisoned");
            return;
        };
        if let Err(err) = mqtt.enqueue(topic, QoS::AtLeastOnce, false, payload.as_bytes()) {
            warn!("publish to {topic} failed: {err:?}");
        }
    }

    fn ring_session(&mut self, index: usize) -> anyhow::Result<()> {
        info!("display: MEDICINE TIME (alarm {})", index + 1);
        self.outputs.set_indicator(true);
        let mut ring = RingSequence::default();

        loop {
            let tone = ring.next_tone();
            self.outputs.play_tone(tone);
            thread::sleep(Duration::from_millis(ring.gap_ms()));

            feed_watchdog();
            self.service_background();

            match self.buttons.poll() {
                Some(Button::Cancel) => {
                    info!("alarm {} cancelled", index + 1);
                    break;
                }
                Some(Button::Ok) => {
                    self.alarms.snooze(index)?;
                    info!("alarm {} snoozed for 5 minutes", index + 1);
                    break;
                }
                _ => {}
            }
        }

        self.outputs.set_indicator(false);
        Ok(())
    }

    fn warning_session(&mut self) {
        if !self.warning_active {
            self.warning_active = true;
            info!("environmental warning, indicator on");
        }
        self.outputs.set_indicator(true);
        let mut siren = WarningSiren::default();

        loop {
            let tone = siren.next_tone();
            self.outputs.play_tone(tone);
            thread::sleep(Duration::from_millis(siren.gap_ms()));

            feed_watchdog();
            self.service_background();

            if matches!(self.buttons.poll(), Some(Button::Cancel)) {
                info!("warning acknowledged");
                break;
            }

            match self.last_environment {
                Some((temperature, humidity))
                    if evaluate_environment(temperature, humidity).active() => {}
                _ => break,
            }
        }
    }
}

fn create_mqtt_client(
    network: &medibox_common::NetworkConfig,
) -> anyhow::Result<(EspMqttClient<'static>, EspMqttConnection)> {
    let url = format!("mqtt://{}:{}", network.mqtt_host, network.mqtt_port);

    let conf = MqttClientConfiguration {
        client_id: Some("medibox-device"),
        username: if network.mqtt_user.is_empty() {
            None
        } else {
            Some(network.mqtt_user.as_str())
        },
        password: if network.mqtt_pass.is_empty() {
            None
        } else {
            Some(network.mqtt_pass.as_str())
        },
        ..Default::default()
    };

    let (client, conn) = EspMqttClient::new(url.as_str(), &conf)?;
    Ok((client, conn))
}

fn spawn_mqtt_receiver(
    mut conn: EspMqttConnection,
    mqtt: Arc<Mutex<EspMqttClient<'static>>>,
    config_tx: mpsc::Sender<Inbound>,
    connected: Arc<AtomicBool>,
) {
    thread::Builder::new()
        .name("mqtt-rx".into())
        .stack_size(8 * 1024)
        .spawn(move || loop {
            match conn.next() {
                Ok(event) => {
                    connected.store(true, Ordering::Relaxed);

                    if let EventPayload::Received {
                        topic: Some(topic),
                        data,
                        details,
                        ..
                    } = event.payload()
                    {
                        if !matches!(details, Details::Complete) {
                            continue;
                        }
                        if data.len() > MAX_MQTT_PAYLOAD_BYTES {
                            warn!(
                                "dropping oversized MQTT payload on topic {} ({} bytes)",
                                topic,
                                data.len()
                            );
                            continue;
                        }
                        if let Ok(payload) = core::str::from_utf8(data) {
                            let _ = config_tx.send(Inbound {
                                topic: topic.to_string(),
                                payload: payload.to_string(),
                            });
                        }
                    }
                }
                Err(err) => {
                    connected.store(false, Ordering::Relaxed);
                    warn!("mqtt receive loop error: {err:?}");
                    thread::sleep(Duration::from_millis(MQTT_RETRY_DELAY_MS));
                    if let Err(sub_err) = subscribe_topics(&mqtt) {
                        warn!("mqtt re-subscribe failed: {sub_err:#}");
                    }
                }
            }
        })
        .expect("failed to spawn mqtt receiver thread");
}

fn subscribe_topics(mqtt: &Arc<Mutex<EspMqttClient<'static>>>) -> anyhow::Result<()> {
    let mut mqtt = mqtt
        .lock()
        .map_err(|_| anyhow!("mqtt client lock poisoned"))?;
    for topic in CONFIG_TOPICS {
        mqtt.subscribe(topic, QoS::AtMostOnce)?;
    }
    Ok(())
}

fn connect_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
    network: &medibox_common::NetworkConfig,
) -> anyhow::Result<EspWifi<'static>> {
    let mut esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;
    let mut wifi = BlockingWifi::wrap(&mut esp_wifi, sys_loop)?;

    let auth_method = if network.wifi_pass.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPAWPA2Personal
    };

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: network
            .wifi_ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: network
            .wifi_pass
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("wifi started, connecting to `{}`", network.wifi_ssid);

    let mut last_err = None;
    for attempt in 1..=WIFI_CONNECT_ATTEMPTS {
        info!("wifi connect attempt {attempt}/{WIFI_CONNECT_ATTEMPTS}");
        match wifi.connect() {
            Ok(()) => match wifi.wait_netif_up() {
                Ok(()) => {
                    info!("wifi connected and netif up on attempt {attempt}");
                    last_err = None;
                    break;
                }
                Err(err) => {
                    warn!("wifi netif up failed on attempt {attempt}: {err:#}");
                    last_err = Some(err);
                }
            },
            Err(err) => {
                warn!("wifi connect failed on attempt {attempt}: {err:#}");
                last_err = Some(err);
            }
        }

        if attempt < WIFI_CONNECT_ATTEMPTS {
            let _ = wifi.disconnect();
            thread::sleep(Duration::from_millis(WIFI_RETRY_DELAY_MS));
        }
    }

    match last_err {
        None => Ok(esp_wifi),
        Some(err) => Err(anyhow!(
            "all {WIFI_CONNECT_ATTEMPTS} wifi connect attempts failed: {err:#}"
        )),
    }
}

fn load_runtime_config(partition: &EspDefaultNvsPartition) -> anyhow::Result<RuntimeConfig> {
    let mut nvs = EspNvs::new(partition.clone(), NVS_NAMESPACE, true)?;
    let mut buffer = vec![0_u8; 4096];

    match nvs.get_str(NVS_RUNTIME_KEY, &mut buffer)? {
        Some(value) => Ok(serde_json::from_str::<RuntimeConfig>(value)?),
        None => Ok(RuntimeConfig::default()),
    }
}

fn init_watchdog(timeout_sec: u32) -> anyhow::Result<()> {
    let config = esp_idf_svc::sys::esp_task_wdt_config_t {
        timeout_ms: timeout_sec.saturating_mul(1000),
        idle_core_mask: 0,
        trigger_panic: true,
    };
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_init(&config) };
    if rc != esp_idf_svc::sys::ESP_OK && rc != esp_idf_svc::sys::ESP_ERR_INVALID_STATE {
        return Err(anyhow!("esp_task_wdt_init failed with code {}", rc));
    }
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_add(std::ptr::null_mut()) };
    if rc != esp_idf_svc::sys::ESP_OK && rc != esp_idf_svc::sys::ESP_ERR_INVALID_ARG {
        return Err(anyhow!("esp_task_wdt_add failed with code {}", rc));
    }
    Ok(())
}

fn feed_watchdog() {
    unsafe {
        esp_idf_svc::sys::esp_task_wdt_reset();
    }
}

fn disable_wifi_power_save() {
    let rc = unsafe { esp_idf_svc::sys::esp_wifi_set_ps(0) };
    if rc == esp_idf_svc::sys::ESP_OK {
        info!("wifi power save disabled");
    } else {
        warn!("failed to disable wifi power save: esp_err_t={rc}");
    }
}

fn monotonic_ms() -> u64 {
    static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
