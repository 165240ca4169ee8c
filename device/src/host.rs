use std::{
    io::ErrorKind,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, OnceLock,
    },
    time::{Duration, Instant},
};

use anyhow::Context;
use chrono::Utc;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tracing::{debug, info, warn};

use medibox_common::{
    apply_config_message, evaluate_environment, vent_angle, Alarms, Button, ClockState,
    ControlParams, DeviceStatePayload, MenuMachine, RingSequence, RuntimeConfig,
    SamplingAggregator, Tone, UtcOffset, WarningSiren, CONFIG_TOPICS, TOPIC_DEVICE_STATUS,
    TOPIC_LIGHT_AVERAGE, TOPIC_TEMPERATURE_AVERAGE,
};

const MAX_MQTT_PAYLOAD_BYTES: usize = 512;
const TICK_MS: u64 = 100;

#[derive(Debug)]
struct Inbound {
    topic: String,
    payload: String,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut runtime = load_runtime_config().unwrap_or_else(|err| {
        warn!("failed to load runtime config: {err:#}");
        RuntimeConfig::default()
    });
    runtime.sanitize();

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or(runtime.network.mqtt_host.clone());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.network.mqtt_port);

    let mut mqtt_options = MqttOptions::new("medibox-device-rust", mqtt_host, mqtt_port);
    let mqtt_user = std::env::var("MQTT_USER").unwrap_or(runtime.network.mqtt_user.clone());
    let mqtt_pass = std::env::var("MQTT_PASS").unwrap_or(runtime.network.mqtt_pass.clone());
    if !mqtt_user.is_empty() {
        mqtt_options.set_credentials(mqtt_user, mqtt_pass);
    }

    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);
    let connected = Arc::new(AtomicBool::new(false));

    let (config_tx, config_rx) = mpsc::unbounded_channel();
    spawn_mqtt_loop(mqtt.clone(), eventloop, config_tx, connected.clone());

    let (button_tx, button_rx) = mpsc::unbounded_channel();
    spawn_button_reader(button_tx);

    mqtt.publish(TOPIC_DEVICE_STATUS, QoS::AtLeastOnce, true, "online")
        .await
        .context("failed to publish device online status")?;

    info!(
        "medibox device started (alarm capacity {}, type up/down/ok/cancel + enter for buttons)",
        runtime.alarm_capacity
    );

    let device = DeviceLoop::new(runtime, mqtt, connected, config_rx, button_rx);
    device.run().await
}

/// The single cooperative control loop. Anything that would block (ring,
/// warning siren) re-enters `service_background` on every iteration so
/// clock, intake, sampling, and publishing are never starved.
struct DeviceLoop {
    clock: ClockState,
    alarms: Alarms,
    menu: MenuMachine,
    params: ControlParams,
    light_agg: SamplingAggregator,
    temp_agg: SamplingAggregator,
    mqtt: AsyncClient,
    connected: Arc<AtomicBool>,
    config_rx: mpsc::UnboundedReceiver<Inbound>,
    button_rx: mpsc::UnboundedReceiver<Button>,
    vent_angle: u8,
    warning_active: bool,
    tick: u64,
}

impl DeviceLoop {
    fn new(
        runtime: RuntimeConfig,
        mqtt: AsyncClient,
        connected: Arc<AtomicBool>,
        config_rx: mpsc::UnboundedReceiver<Inbound>,
        button_rx: mpsc::UnboundedReceiver<Button>,
    ) -> Self {
        let now_ms = monotonic_ms();
        let params = runtime.params.clone();

        let mut clock = ClockState::default();
        clock.utc_offset = UtcOffset::from_minutes(runtime.utc_offset_minutes);

        Self {
            clock,
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
            connected,
            config_rx,
            button_rx,
            vent_angle: 0,
            warning_active: false,
            tick: 0,
        }
    }

    async fn run(mut self) -> anyhow::Result<()> {
        let mut interval = tokio::time::interval(Duration::from_millis(TICK_MS));

        loop {
            interval.tick().await;
            self.tick = self.tick.wrapping_add(1);

            self.service_background().await;

            let reading = self.clock.reading;
            if let Some(index) = self.alarms.due(reading.hour, reading.minute) {
                self.alarms.fire(index)?;
                self.ring_session(index).await?;
            }

            while let Ok(button) = self.button_rx.try_recv() {
                let effects = self.menu.handle(button, &mut self.alarms, &mut self.clock);
                for effect in effects {
                    info!("menu: {effect:?}");
                }
                for line in self.menu.render(&self.alarms) {
                    info!("display: {line}");
                }
            }

            let (temperature, humidity) = self.read_environment();
            let status = evaluate_environment(temperature, humidity);
            for line in &status.status_lines {
                debug!("display: {line}");
            }
            if status.active() {
                self.warning_session().await;
            } else if self.warning_active {
                self.warning_active = false;
                info!("warning cleared, indicator off");
            }

            let angle = vent_angle(&self.params, self.temp_agg.current_average());
            if angle != self.vent_angle {
                self.vent_angle = angle;
                // Hardware integration point: the ESP32 build drives the
                // servo from here.
                info!("vent angle: {angle}");
            }
        }
    }

    /// The background duties every suspension point must keep alive:
    /// clock refresh, config intake, sampling, and publishing.
    async fn service_background(&mut self) {
        // The host wall clock cannot fail; the ESP32 build degrades and
        // retries here when SNTP has not synced yet.
        self.clock.refresh(Utc::now());
        self.drain_config();
        self.run_samplers().await;
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
                None => {
                    debug!(
                        "dropped config payload `{}` on {}",
                        message.payload, message.topic
                    );
                }
            }
        }
    }

    async fn run_samplers(&mut self) {
        let now_ms = monotonic_ms();

        if self.light_agg.sample_due(now_ms) {
            let level = self.read_light_level();
            debug!("light reading: {level}");
            self.light_agg.record_sample(now_ms, level);
        }
        if self.temp_agg.sample_due(now_ms) {
            let (temperature, _) = self.read_environment();
            debug!("temperature reading: {temperature:.1}");
            self.temp_agg.record_sample(now_ms, temperature as i64);
        }

        // Skipping the publish while disconnected keeps the accumulated
        // window intact for the next boundary after reconnect.
        if !self.connected.load(Ordering::Relaxed) {
            return;
        }

        if let Some(average) = self.light_agg.try_publish(now_ms) {
            self.publish(TOPIC_LIGHT_AVERAGE, average.to_string()).await;
        }
        if let Some(average) = self.temp_agg.try_publish(now_ms) {
            self.publish(TOPIC_TEMPERATURE_AVERAGE, average.to_string())
                .await;

            let state = DeviceStatePayload {
                light_average: self.light_agg.current_average(),
                temperature_average: average,
                vent_angle: self.vent_angle,
                warning_active: self.warning_active,
            };
            match serde_json::to_string(&state) {
                Ok(body) => self.publish(TOPIC_DEVICE_STATUS, body).await,
                Err(err) => warn!("device state serialization failed: {err}"),
            }
        }
    }

    async fn publish(&self, topic: &str, payload: String) {
        if let Err(err) = self
            .mqtt
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
        {
            warn!("publish to {topic} failed: {err}");
        }
    }

    /// Rings the melody until cancelled or snoozed. Each note is a
    /// suspension point: background duties run before the buttons are
    /// polled again.
    async fn ring_session(&mut self, index: usize) -> anyhow::Result<()> {
        info!("display: MEDICINE TIME (alarm {})", index + 1);
        let mut ring = RingSequence::default();

        loop {
            let tone = ring.next_tone();
            self.play_tone(tone).await;
            tokio::time::sleep(Duration::from_millis(ring.gap_ms())).await;

            self.service_background().await;

            match self.button_rx.try_recv() {
                Ok(Button::Cancel) => {
                    info!("alarm {} cancelled", index + 1);
                    break;
                }
                Ok(Button::Ok) => {
                    self.alarms.snooze(index)?;
                    info!("alarm {} snoozed for 5 minutes", index + 1);
                    break;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Sounds the two-tone warning until the cancel button is pressed,
    /// servicing transport and both samplers between tones.
    async fn warning_session(&mut self) {
        if !self.warning_active {
            self.warning_active = true;
            info!("environmental warning, indicator on");
        }
        let mut siren = WarningSiren::default();

        loop {
            let tone = siren.next_tone();
            self.play_tone(tone).await;
            tokio::time::sleep(Duration::from_millis(siren.gap_ms())).await;

            self.service_background().await;

            if matches!(self.button_rx.try_recv(), Ok(Button::Cancel)) {
                info!("warning acknowledged");
                break;
            }

            let (temperature, humidity) = self.read_environment();
            if !evaluate_environment(temperature, humidity).active() {
                break;
            }
        }
    }

    async fn play_tone(&self, tone: Tone) {
        // Hardware integration point: the ESP32 build drives the buzzer.
        debug!("tone {} Hz for {} ms", tone.frequency_hz, tone.duration_ms);
        tokio::time::sleep(Duration::from_millis(tone.duration_ms)).await;
    }

    // Simulated sensors; the ESP32 build replaces these with the LDR ADC
    // and DHT22 drivers.
    fn read_light_level(&self) -> i64 {
        2_000 + ((self.tick % 16) as i64 * 40)
    }

    fn read_environment(&self) -> (f32, f32) {
        let temperature = 27.0 + ((self.tick % 10) as f32 * 0.3);
        let humidity = 72.0 + ((self.tick % 6) as f32 * 0.5);
        (temperature, humidity)
    }
}

fn spawn_mqtt_loop(
    mqtt: AsyncClient,
    mut eventloop: rumqttc::EventLoop,
    config_tx: mpsc::UnboundedSender<Inbound>,
    connected: Arc<AtomicBool>,
) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                    connected.store(true, Ordering::Relaxed);
                    for topic in CONFIG_TOPICS {
                        if let Err(err) = mqtt.subscribe(topic, QoS::AtMostOnce).await {
                            warn!("subscribe to {topic} failed: {err}");
                        }
                    }
                }
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if message.payload.len() > MAX_MQTT_PAYLOAD_BYTES {
                        warn!(
                            "dropping oversized MQTT payload on topic {} ({} bytes)",
                            message.topic,
                            message.payload.len()
                        );
                        continue;
                    }
                    match String::from_utf8(message.payload.to_vec()) {
                        Ok(payload) => {
                            let _ = config_tx.send(Inbound {
                                topic: message.topic,
                                payload,
                            });
                        }
                        Err(_) => warn!("non utf8 mqtt payload on {}", message.topic),
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    connected.store(false, Ordering::Relaxed);
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

/// Reads simulated button edges from stdin, one word per line.
fn spawn_button_reader(button_tx: mpsc::UnboundedSender<Button>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let button = match line.trim().to_ascii_lowercase().as_str() {
                "u" | "up" => Button::Up,
                "d" | "down" => Button::Down,
                "o" | "ok" => Button::Ok,
                "c" | "cancel" => Button::Cancel,
                _ => continue,
            };
            if button_tx.send(button).is_err() {
                break;
            }
        }
    });
}

fn load_runtime_config() -> anyhow::Result<RuntimeConfig> {
    let data_dir = std::env::var("MEDIBOX_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./.medibox"));
    let path = data_dir.join("runtime.json");

    match std::fs::read(&path) {
        Ok(raw) => serde_json::from_slice::<RuntimeConfig>(&raw)
            .with_context(|| format!("invalid runtime config at {}", path.display())),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
        Err(err) => Err(err.into()),
    }
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
