use std::path::PathBuf;
use std::time::{Duration as StdDuration, Instant};

use anyhow::Result;
use chrono::{Duration, Local, NaiveDate, NaiveDateTime};
use eframe::egui::{self, Align, Color32, Layout, RichText};
use tracing::{info, warn};

use salat_core::location::{Location, LocationStore};
use salat_core::notify::{due_event_message, DesktopNotifier, Notifier};
use salat_core::prayer_api::{PrayerDay, DEFAULT_METHOD};
use salat_core::schedule::Prayer;
use salat_core::scheduler::{
    DueEvent, Evaluation, FiredEvents, NextPrayerScheduler, IMSAK_LEAD_MINUTES,
};

use crate::fetch::{self, FetchJob, FetchOutcome};

const BG_DARK: Color32 = Color32::from_rgb(0x0d, 0x11, 0x17);
const BG_CARD: Color32 = Color32::from_rgb(0x16, 0x1b, 0x22);
const BORDER_COLOR: Color32 = Color32::from_rgb(0x2e, 0xa0, 0x43);
const ACCENT_GOLD: Color32 = Color32::from_rgb(0xf0, 0xc0, 0x40);
const ACCENT_GREEN: Color32 = Color32::from_rgb(0x3f, 0xb9, 0x50);
const TEXT_WHITE: Color32 = Color32::from_rgb(0xe6, 0xed, 0xf3);
const TEXT_DIM: Color32 = Color32::from_rgb(0x8b, 0x94, 0x9e);
const TEXT_RED: Color32 = Color32::from_rgb(0xff, 0x6b, 0x6b);
const TEXT_FAJR: Color32 = Color32::from_rgb(0x7e, 0xc8, 0xe3);
const TEXT_MAGHRIB: Color32 = Color32::from_rgb(0xff, 0xa0, 0x7a);

const FULL_SIZE: [f32; 2] = [380.0, 660.0];
const COMPACT_SIZE: [f32; 2] = [320.0, 92.0];

/// Minimum pause between refresh attempts after a failure.
const FETCH_RETRY: StdDuration = StdDuration::from_secs(30);
/// A worker that produced no outcome by this age is considered lost.
const FETCH_DEADLINE: StdDuration = StdDuration::from_secs(60);

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub method: u32,
    pub tick: StdDuration,
    pub ramadan_override: Option<bool>,
    pub location_file: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(method) = std::env::var("SALAT_METHOD") {
            if let Ok(value) = method.trim().parse::<u32>() {
                config.method = value;
            }
        }
        if let Ok(tick) = std::env::var("SALAT_TICK_MS") {
            if let Ok(value) = tick.trim().parse::<u64>() {
                if value > 0 {
                    config.tick = StdDuration::from_millis(value);
                }
            }
        }
        if let Ok(flag) = std::env::var("SALAT_RAMADAN") {
            config.ramadan_override = parse_bool_flag(&flag);
        }
        if let Ok(path) = std::env::var("SALAT_LOCATION_FILE") {
            if !path.trim().is_empty() {
                config.location_file = Some(PathBuf::from(path));
            }
        }
        Ok(config)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            method: DEFAULT_METHOD,
            tick: StdDuration::from_millis(1000),
            ramadan_override: None,
            location_file: None,
        }
    }
}

fn parse_bool_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Default)]
struct LocationEditor {
    city: String,
    region: String,
    country: String,
    lat: String,
    lon: String,
    timezone: String,
    error: Option<String>,
}

impl LocationEditor {
    fn from_location(location: &Location) -> Self {
        Self {
            city: location.city.clone(),
            region: location.region.clone(),
            country: location.country.clone(),
            lat: location.lat.to_string(),
            lon: location.lon.to_string(),
            timezone: location.timezone.clone(),
            error: None,
        }
    }

    fn parse(&self) -> Result<Location, String> {
        let lat: f64 = self
            .lat
            .trim()
            .parse()
            .map_err(|_| "Latitude must be a number".to_string())?;
        let lon: f64 = self
            .lon
            .trim()
            .parse()
            .map_err(|_| "Longitude must be a number".to_string())?;
        Ok(Location {
            city: self.city.trim().to_string(),
            region: self.region.trim().to_string(),
            country: self.country.trim().to_string(),
            lat,
            lon,
            timezone: self.timezone.trim().to_string(),
        })
    }
}

enum EditorAction {
    None,
    Save,
    UseIp,
    Cancel,
}

pub struct WidgetApp {
    config: AppConfig,
    store: LocationStore,
    notifier: Box<dyn Notifier>,
    fired: FiredEvents,
    location: Option<Location>,
    day: Option<PrayerDay>,
    fetch: Option<FetchJob>,
    last_attempt: Option<Instant>,
    refetch_requested: bool,
    load_error: Option<String>,
    compact: bool,
    editor: Option<LocationEditor>,
}

impl WidgetApp {
    pub fn new(config: AppConfig) -> Self {
        let store_path = config
            .location_file
            .clone()
            .or_else(LocationStore::default_path)
            .unwrap_or_else(|| PathBuf::from("location.json"));
        info!(path = %store_path.display(), "manual location file");
        Self {
            config,
            store: LocationStore::new(store_path),
            notifier: Box::new(DesktopNotifier::new()),
            fired: FiredEvents::new(),
            location: None,
            day: None,
            fetch: None,
            last_attempt: None,
            refetch_requested: false,
            load_error: None,
            compact: false,
            editor: None,
        }
    }

    fn poll_fetch(&mut self) {
        let Some(job) = &self.fetch else { return };
        let Some(outcome) = job.poll() else { return };
        self.fetch = None;
        self.refetch_requested = false;
        match outcome {
            FetchOutcome::Ready { location, day } => {
                info!(day = %day.schedule.day(), city = %location.city, "schedule replaced");
                self.location = Some(location);
                self.day = Some(day);
                // New schedule, fresh firing slate.
                self.fired.clear();
                self.load_error = None;
            }
            FetchOutcome::Failed { location, error } => {
                warn!(%error, "refresh failed, keeping cached data");
                if self.location.is_none() {
                    self.location = Some(location);
                }
                self.load_error = Some(error);
            }
        }
    }

    fn ensure_schedule(&mut self, today: NaiveDate) {
        if let Some(job) = &self.fetch {
            if job.age() < FETCH_DEADLINE {
                return;
            }
            warn!("refresh worker unresponsive, dropping it");
            self.fetch = None;
        }
        let fresh = self
            .day
            .as_ref()
            .is_some_and(|day| day.schedule.day() == today);
        if fresh && !self.refetch_requested {
            return;
        }
        if let Some(last) = self.last_attempt {
            if last.elapsed() < FETCH_RETRY {
                return;
            }
        }
        self.last_attempt = Some(Instant::now());
        info!(%today, "requesting schedule refresh");
        self.fetch = Some(fetch::spawn(self.config.method, today, self.store.clone()));
    }

    fn evaluate(&mut self, now: NaiveDateTime) -> Option<Evaluation> {
        let day = self.day.as_ref()?;
        if day.schedule.day() != now.date() {
            // Stale schedule; ensure_schedule is already refetching. Never
            // evaluate yesterday's timestamps against today's clock.
            return None;
        }
        let tolerance =
            Duration::from_std(self.config.tick).unwrap_or_else(|_| Duration::seconds(1));
        let scheduler = NextPrayerScheduler::new(tolerance).with_ramadan(self.ramadan_active());
        Some(scheduler.evaluate(&day.schedule, now, &mut self.fired))
    }

    fn dispatch(&mut self, due_events: &[DueEvent]) {
        for event in due_events {
            let (title, body, timeout_ms) = due_event_message(event);
            info!(
                observance = %event.observance,
                minutes = event.offset.minutes(),
                "reminder due"
            );
            self.notifier.notify(&title, &body, timeout_ms);
        }
    }

    fn ramadan_active(&self) -> bool {
        self.config.ramadan_override.unwrap_or_else(|| {
            self.day
                .as_ref()
                .map(|day| day.hijri.is_ramadan())
                .unwrap_or(false)
        })
    }

    fn request_refresh(&mut self) {
        self.refetch_requested = true;
        self.last_attempt = None;
    }

    fn open_editor(&mut self) {
        let seed = self.location.clone().unwrap_or_else(Location::fallback);
        self.editor = Some(LocationEditor::from_location(&seed));
    }

    fn toggle_compact(&mut self, ctx: &egui::Context) {
        self.compact = !self.compact;
        let size = if self.compact { COMPACT_SIZE } else { FULL_SIZE };
        ctx.send_viewport_cmd(egui::ViewportCommand::InnerSize(egui::vec2(
            size[0], size[1],
        )));
    }

    fn draw(&mut self, ctx: &egui::Context, now: NaiveDateTime, eval: Option<&Evaluation>) {
        let frame = egui::Frame::default()
            .fill(BG_DARK)
            .stroke(egui::Stroke::new(2.0, BORDER_COLOR))
            .inner_margin(egui::Margin::same(10));
        egui::CentralPanel::default().frame(frame).show(ctx, |ui| {
            self.title_bar(ctx, ui);
            if self.compact {
                self.draw_compact(ui, eval);
            } else {
                self.draw_full(ui, now, eval);
            }
        });
        self.draw_editor(ctx);
    }

    fn title_bar(&mut self, ctx: &egui::Context, ui: &mut egui::Ui) {
        let bar_rect = {
            let mut rect = ui.max_rect();
            rect.max.y = rect.min.y + 26.0;
            rect
        };
        let response = ui.interact(
            bar_rect,
            egui::Id::new("title_bar"),
            egui::Sense::click_and_drag(),
        );
        if response.drag_started_by(egui::PointerButton::Primary) {
            ctx.send_viewport_cmd(egui::ViewportCommand::StartDrag);
        }

        ui.horizontal(|ui| {
            ui.label(RichText::new("🕌 PRAYER TIME").color(ACCENT_GOLD).strong());
            ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                if ui.button(RichText::new("✕").color(TEXT_RED)).clicked() {
                    ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                }
                let compact_icon = if self.compact { "◻" } else { "─" };
                if ui
                    .button(RichText::new(compact_icon).color(ACCENT_GOLD))
                    .clicked()
                {
                    self.toggle_compact(ctx);
                }
                if !self.compact {
                    let pin = ui
                        .button(RichText::new("📍").color(ACCENT_GREEN))
                        .on_hover_text("Set location");
                    if pin.clicked() {
                        self.open_editor();
                    }
                }
            });
        });
        ui.add_space(4.0);
    }

    fn draw_full(&self, ui: &mut egui::Ui, now: NaiveDateTime, eval: Option<&Evaluation>) {
        ui.vertical_centered(|ui| {
            ui.label(
                RichText::new("بِسْمِ اللَّهِ الرَّحْمٰنِ الرَّحِيْمِ")
                    .color(ACCENT_GOLD)
                    .size(18.0),
            );
            ui.add_space(4.0);
            self.location_line(ui);
            ui.label(
                RichText::new(format!("📅 {}", now.format("%A, %d %B %Y"))).color(TEXT_WHITE),
            );
            match &self.day {
                Some(day) => {
                    ui.label(RichText::new(format!("☪ {}", day.hijri)).color(ACCENT_GOLD));
                }
                None => {
                    ui.label(RichText::new("☪ Loading Hijri date…").color(TEXT_DIM));
                }
            }
            ui.label(
                RichText::new(now.format("%H:%M:%S").to_string())
                    .color(ACCENT_GOLD)
                    .size(30.0)
                    .strong(),
            );
        });
        ui.separator();
        self.prayer_grid(ui, eval);
        ui.separator();
        self.countdown_block(ui, eval);
        if self.ramadan_active() {
            ui.add_space(6.0);
            self.ramadan_block(ui, now);
        }
    }

    fn location_line(&self, ui: &mut egui::Ui) {
        match (&self.location, &self.load_error) {
            (Some(location), None) => {
                ui.label(RichText::new(format!("📍 {}", location.label())).color(ACCENT_GREEN));
            }
            (Some(location), Some(_)) => {
                // Stale but usable; the countdown keeps running on cached data.
                ui.label(RichText::new(format!("📍 {}", location.label())).color(ACCENT_GREEN));
                ui.label(RichText::new("⚠ offline, showing cached times").color(TEXT_DIM));
            }
            (None, Some(error)) => {
                let short: String = error.chars().take(60).collect();
                ui.label(RichText::new(format!("⚠ Could not load data: {short}")).color(TEXT_RED));
            }
            (None, None) => {
                ui.label(RichText::new("📍 Detecting location…").color(TEXT_DIM));
            }
        }
    }

    fn prayer_grid(&self, ui: &mut egui::Ui, eval: Option<&Evaluation>) {
        let Some(day) = &self.day else {
            let text = if self.load_error.is_some() {
                "Prayer times unavailable"
            } else {
                "Loading prayer times…"
            };
            ui.vertical_centered(|ui| ui.label(RichText::new(text).color(TEXT_DIM)));
            return;
        };
        let next = eval.and_then(|eval| eval.next_prayer).map(|(prayer, _)| prayer);
        egui::Grid::new("prayer_grid")
            .num_columns(2)
            .spacing([24.0, 4.0])
            .min_col_width(160.0)
            .show(ui, |ui| {
                for (prayer, at) in day.schedule.entries() {
                    let color = if next == Some(prayer) {
                        ACCENT_GREEN
                    } else {
                        prayer_color(prayer)
                    };
                    let name = RichText::new(prayer.display_name()).color(color);
                    let name = if next == Some(prayer) { name.strong() } else { name };
                    ui.label(name);
                    ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                        ui.label(
                            RichText::new(at.format("%H:%M").to_string())
                                .color(color)
                                .strong(),
                        );
                    });
                    ui.end_row();
                }
            });
    }

    fn countdown_block(&self, ui: &mut egui::Ui, eval: Option<&Evaluation>) {
        ui.vertical_centered(|ui| {
            ui.label(RichText::new("NEXT PRAYER").color(TEXT_DIM).small());
            match eval.and_then(|eval| eval.next_prayer.map(|next| (next, eval.remaining))) {
                Some(((prayer, _), remaining)) => {
                    ui.label(
                        RichText::new(prayer.display_name())
                            .color(prayer_color(prayer))
                            .size(18.0)
                            .strong(),
                    );
                    let remaining = remaining.unwrap_or_else(Duration::zero);
                    let color = if remaining < Duration::minutes(5) {
                        TEXT_RED
                    } else {
                        ACCENT_GOLD
                    };
                    ui.label(
                        RichText::new(format_countdown(remaining))
                            .color(color)
                            .size(30.0)
                            .strong(),
                    );
                }
                None => {
                    let text = if self.day.is_some() {
                        "All prayers done for today ✓"
                    } else {
                        "—"
                    };
                    ui.label(RichText::new(text).color(TEXT_DIM).size(16.0));
                    ui.label(RichText::new("——:——:——").color(TEXT_DIM).size(30.0));
                }
            }
        });
    }

    fn ramadan_block(&self, ui: &mut egui::Ui, now: NaiveDateTime) {
        let Some(day) = &self.day else { return };
        let imsak = day.schedule.time_of(Prayer::Fajr) - Duration::minutes(IMSAK_LEAD_MINUTES);
        let iftar = day.schedule.time_of(Prayer::Maghrib);
        egui::Frame::default()
            .fill(BG_CARD)
            .stroke(egui::Stroke::new(1.0, BORDER_COLOR))
            .inner_margin(egui::Margin::same(8))
            .show(ui, |ui| {
                ui.vertical_centered(|ui| {
                    ui.label(
                        RichText::new("🌙 RAMADAN — IMSAK & IFTAR")
                            .color(ACCENT_GOLD)
                            .strong(),
                    );
                });
                ramadan_row(ui, "Imsak (Fajr)", TEXT_FAJR, imsak, now);
                ramadan_row(ui, "Iftar (Maghrib)", TEXT_MAGHRIB, iftar, now);
            });
    }

    fn draw_compact(&self, ui: &mut egui::Ui, eval: Option<&Evaluation>) {
        ui.horizontal(|ui| {
            match eval.and_then(|eval| eval.next_prayer.map(|next| (next, eval.remaining))) {
                Some(((prayer, _), remaining)) => {
                    ui.label(
                        RichText::new(prayer.display_name())
                            .color(prayer_color(prayer))
                            .size(18.0)
                            .strong(),
                    );
                    ui.label(
                        RichText::new(format_countdown(remaining.unwrap_or_else(Duration::zero)))
                            .color(ACCENT_GOLD)
                            .size(18.0)
                            .strong(),
                    );
                }
                None => {
                    ui.label(
                        RichText::new("All done ✓ ——:——:——")
                            .color(TEXT_DIM)
                            .size(16.0),
                    );
                }
            }
        });
    }

    fn draw_editor(&mut self, ctx: &egui::Context) {
        let mut action = EditorAction::None;
        if let Some(editor) = self.editor.as_mut() {
            egui::Window::new("📍 Set Location")
                .collapsible(false)
                .resizable(false)
                .show(ctx, |ui| {
                    action = editor_ui(ui, editor);
                });
        }
        match action {
            EditorAction::None => {}
            EditorAction::Cancel => self.editor = None,
            EditorAction::UseIp => {
                if let Err(err) = self.store.clear() {
                    warn!(%err, "could not clear manual location");
                }
                self.editor = None;
                self.request_refresh();
            }
            EditorAction::Save => {
                let parsed = self.editor.as_ref().map(LocationEditor::parse);
                match parsed {
                    Some(Ok(location)) => {
                        if let Err(err) = self.store.save(&location) {
                            warn!(%err, "could not save manual location");
                        }
                        self.editor = None;
                        self.request_refresh();
                    }
                    Some(Err(message)) => {
                        if let Some(editor) = self.editor.as_mut() {
                            editor.error = Some(message);
                        }
                    }
                    None => {}
                }
            }
        }
    }
}

impl eframe::App for WidgetApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // One pass of this function is one host tick.
        ctx.request_repaint_after(self.config.tick);
        let now = Local::now().naive_local();

        self.poll_fetch();
        self.ensure_schedule(now.date());
        let eval = self.evaluate(now);
        if let Some(eval) = &eval {
            self.dispatch(&eval.due_events);
        }
        self.draw(ctx, now, eval.as_ref());
    }
}

fn editor_ui(ui: &mut egui::Ui, editor: &mut LocationEditor) -> EditorAction {
    let mut action = EditorAction::None;
    egui::Grid::new("location_editor")
        .num_columns(2)
        .spacing([8.0, 4.0])
        .show(ui, |ui| {
            for (label, value) in [
                ("City", &mut editor.city),
                ("Region", &mut editor.region),
                ("Country", &mut editor.country),
                ("Latitude", &mut editor.lat),
                ("Longitude", &mut editor.lon),
                ("Timezone", &mut editor.timezone),
            ] {
                ui.label(label);
                ui.text_edit_singleline(value);
                ui.end_row();
            }
        });
    if let Some(error) = &editor.error {
        ui.label(RichText::new(error).color(TEXT_RED));
    }
    ui.horizontal(|ui| {
        if ui.button("Save").clicked() {
            action = EditorAction::Save;
        }
        if ui.button("Refresh from IP").clicked() {
            action = EditorAction::UseIp;
        }
        if ui.button("Cancel").clicked() {
            action = EditorAction::Cancel;
        }
    });
    action
}

fn ramadan_row(
    ui: &mut egui::Ui,
    label: &str,
    color: Color32,
    at: NaiveDateTime,
    now: NaiveDateTime,
) {
    ui.horizontal(|ui| {
        ui.label(RichText::new(label).color(color));
        ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
            if at > now {
                ui.label(RichText::new(format_countdown(at - now)).color(color).strong());
            } else {
                ui.label(RichText::new("passed ✓").color(TEXT_DIM));
            }
        });
    });
}

fn prayer_color(prayer: Prayer) -> Color32 {
    match prayer {
        Prayer::Fajr => TEXT_FAJR,
        Prayer::Maghrib => TEXT_MAGHRIB,
        _ => TEXT_WHITE,
    }
}

/// Formats a countdown as `HH:MM:SS`; negatives clamp to zero.
fn format_countdown(remaining: Duration) -> String {
    let secs = remaining.num_seconds().max(0);
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

pub fn run(config: AppConfig) -> Result<()> {
    info!(method = config.method, tick_ms = config.tick.as_millis() as u64, "starting widget");
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Prayer Time")
            .with_inner_size(FULL_SIZE)
            .with_always_on_top()
            .with_decorations(false)
            .with_resizable(false),
        ..Default::default()
    };
    let app = WidgetApp::new(config);
    eframe::run_native(
        "Prayer Time",
        options,
        Box::new(move |_cc| Ok(Box::new(app))),
    )
    .map_err(|err| anyhow::anyhow!("failed to launch prayer widget: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn countdown_formats_hours_minutes_seconds() {
        assert_eq!(format_countdown(Duration::seconds(0)), "00:00:00");
        assert_eq!(format_countdown(Duration::seconds(59)), "00:00:59");
        assert_eq!(format_countdown(Duration::minutes(5)), "00:05:00");
        assert_eq!(
            format_countdown(Duration::hours(3) + Duration::seconds(61)),
            "03:01:01"
        );
    }

    #[test]
    fn countdown_clamps_negative_durations() {
        assert_eq!(format_countdown(Duration::seconds(-30)), "00:00:00");
    }

    #[test]
    fn bool_flag_parsing() {
        assert_eq!(parse_bool_flag("1"), Some(true));
        assert_eq!(parse_bool_flag(" TRUE "), Some(true));
        assert_eq!(parse_bool_flag("off"), Some(false));
        assert_eq!(parse_bool_flag("maybe"), None);
    }

    #[test]
    fn editor_parses_coordinates() {
        let editor = LocationEditor {
            city: " Bandung ".into(),
            region: "West Java".into(),
            country: "ID".into(),
            lat: "-6.9175".into(),
            lon: "107.6191".into(),
            timezone: "Asia/Jakarta".into(),
            error: None,
        };
        let location = editor.parse().expect("valid editor input");
        assert_eq!(location.city, "Bandung");
        assert!((location.lon - 107.6191).abs() < f64::EPSILON);
    }

    #[test]
    fn editor_rejects_non_numeric_latitude() {
        let editor = LocationEditor {
            lat: "north".into(),
            lon: "0".into(),
            ..LocationEditor::default()
        };
        let err = editor.parse().unwrap_err();
        assert!(err.contains("Latitude"));
    }
}
