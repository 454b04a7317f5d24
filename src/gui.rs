//! KeyTape GUI 模块
//!
//! 使用 egui/eframe 实现的主窗口：
//! - 工具栏：Open、Save、Rec、Stop Rec、Play、Stop、Pause、Resume
//! - 「Other」菜单：回放速度、重复次数、循环、热键
//! - 文件路径、进度条、状态、提示横幅
//!
//! 界面只调用会话控制器并读取它发布的更新，从不直接操作输入设备。

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::Local;
use crossbeam_channel::Receiver;
use eframe::egui;
use log::{info, warn};
use tray_icon::menu::MenuEvent;

use crate::config::{self, Settings};
use crate::session::{Notice, NoticeLevel, SessionController, SessionSnapshot, SessionUpdate, Status};
use crate::tray::{self, SystemTray, TrayEvent};

/// 提示横幅显示多久
const NOTICE_TTL: Duration = Duration::from_secs(5);

/// 当前打开的输入框
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prompt {
    Repeat,
    Hotkeys,
}

/// GUI 应用状态
pub struct KeyTapeApp {
    controller: SessionController,
    updates: Receiver<SessionUpdate>,
    tray: Option<SystemTray>,
    menu_events: Receiver<MenuEvent>,
    /// 最近一次发布的状态
    status: Status,
    progress: u8,
    /// 文件路径输入框
    path_input: String,
    repeat_input: String,
    record_hotkey_input: String,
    play_hotkey_input: String,
    prompt: Option<Prompt>,
    /// 提示、时间戳、出现时刻
    notice: Option<(Notice, String, Instant)>,
    closed: bool,
}

impl KeyTapeApp {
    /// 创建新的 GUI 应用
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        controller: SessionController,
        tray: Option<SystemTray>,
    ) -> Self {
        configure_style(&cc.egui_ctx);

        let snapshot = controller.snapshot();
        Self {
            updates: controller.updates(),
            controller,
            tray,
            menu_events: tray::menu_event_receiver(),
            status: snapshot.status,
            progress: snapshot.progress,
            path_input: format!("macro.{}", config::RECORDING_EXTENSION),
            repeat_input: snapshot.repeat_count.to_string(),
            record_hotkey_input: String::new(),
            play_hotkey_input: String::new(),
            prompt: None,
            notice: None,
            closed: false,
        }
    }

    fn show_notice(&mut self, notice: Notice) {
        let stamp = Local::now().format("%H:%M:%S").to_string();
        self.notice = Some((notice, stamp, Instant::now()));
    }

    /// 读取控制器发布的更新
    fn drain_updates(&mut self) {
        while let Ok(update) = self.updates.try_recv() {
            match update {
                SessionUpdate::Status { status, progress } => {
                    self.status = status;
                    self.progress = progress;
                }
                SessionUpdate::Notice(notice) => self.show_notice(notice),
            }
        }
    }

    /// 处理托盘菜单事件
    fn poll_tray(&mut self, ctx: &egui::Context) {
        while let Ok(event) = self.menu_events.try_recv() {
            let tray_event = self.tray.as_ref().and_then(|t| t.handle_menu_event(&event));
            if tray_event == Some(TrayEvent::Quit) {
                info!("托盘菜单: 退出");
                self.close();
                ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            }
        }
    }

    /// 停止录制/回放并保存设置（只执行一次）
    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.controller.shutdown();
        save_settings(&self.controller.settings());
    }

    /// 路径输入框里的文件；没有扩展名时补上 `.rec`
    fn chosen_path(&mut self) -> Option<PathBuf> {
        let trimmed = self.path_input.trim();
        if trimmed.is_empty() {
            self.show_notice(Notice {
                level: NoticeLevel::Warning,
                title: "File error".into(),
                message: "Please enter a file path.".into(),
            });
            return None;
        }
        let mut path = PathBuf::from(trimmed);
        if path.extension().is_none() {
            path.set_extension(config::RECORDING_EXTENSION);
        }
        Some(path)
    }

    /// 渲染工具栏
    fn render_toolbar(&mut self, ui: &mut egui::Ui, snapshot: &SessionSnapshot) {
        egui::menu::bar(ui, |ui| {
            let idle = !snapshot.armed && !snapshot.playing;

            if ui.add_enabled(!snapshot.armed, egui::Button::new("📂 Open")).clicked() {
                if let Some(path) = self.chosen_path() {
                    if let Ok(count) = self.controller.open(&path) {
                        info!("已打开 {:?}（{} 个动作）", path, count);
                    }
                }
            }
            if ui.button("💾 Save").clicked() {
                if let Some(path) = self.chosen_path() {
                    if let Ok(count) = self.controller.save(&path) {
                        self.show_notice(Notice {
                            level: NoticeLevel::Info,
                            title: "Saved".into(),
                            message: format!("Saved {} actions to {}", count, path.display()),
                        });
                    }
                }
            }

            ui.separator();

            if ui.add_enabled(idle, egui::Button::new("⏺ Rec")).clicked() {
                let _ = self.controller.toggle_recording();
            }
            if ui.add_enabled(snapshot.armed, egui::Button::new("⏹ Stop Rec")).clicked() {
                let _ = self.controller.toggle_recording();
            }

            ui.separator();

            if ui.add_enabled(idle, egui::Button::new("▶ Play")).clicked() {
                let _ = self.controller.start_playback();
            }
            if ui.add_enabled(snapshot.playing, egui::Button::new("⏹ Stop")).clicked() {
                self.controller.stop_playback();
            }
            if ui
                .add_enabled(snapshot.playing && !snapshot.paused, egui::Button::new("⏸ Pause"))
                .clicked()
            {
                self.controller.pause_playback();
            }
            if ui.add_enabled(snapshot.paused, egui::Button::new("⏵ Resume")).clicked() {
                self.controller.resume_playback();
            }

            ui.separator();
            self.render_other_menu(ui, snapshot);
        });
    }

    /// 「Other」菜单
    fn render_other_menu(&mut self, ui: &mut egui::Ui, snapshot: &SessionSnapshot) {
        ui.menu_button("Other", |ui| {
            ui.label(egui::RichText::new("Speed").strong());
            for preset in config::SPEED_PRESETS {
                let selected = (snapshot.speed - preset).abs() < f64::EPSILON;
                if ui.selectable_label(selected, format!("x{}", preset)).clicked() {
                    let _ = self.controller.set_speed(preset);
                    ui.close_menu();
                }
            }

            ui.separator();

            if ui.button(format!("Repeat ({})…", snapshot.repeat_count)).clicked() {
                self.repeat_input = snapshot.repeat_count.to_string();
                self.prompt = Some(Prompt::Repeat);
                ui.close_menu();
            }

            let mut looping = snapshot.loop_forever;
            if ui.checkbox(&mut looping, "Loop").clicked() {
                self.controller.toggle_loop();
            }

            if ui.button("Set Hotkeys…").clicked() {
                self.record_hotkey_input.clear();
                self.play_hotkey_input.clear();
                self.prompt = Some(Prompt::Hotkeys);
                ui.close_menu();
            }
        });
    }

    /// 重复次数和热键的输入框
    fn render_prompt(&mut self, ctx: &egui::Context, snapshot: &SessionSnapshot) {
        let Some(prompt) = self.prompt else {
            return;
        };

        let mut done = false;
        match prompt {
            Prompt::Repeat => {
                egui::Window::new("Repeat")
                    .collapsible(false)
                    .resizable(false)
                    .show(ctx, |ui| {
                        ui.label("How many times to play the recording?");
                        ui.text_edit_singleline(&mut self.repeat_input);
                        ui.horizontal(|ui| {
                            if ui.button("OK").clicked() {
                                done = self
                                    .controller
                                    .set_repeat_count_from_input(&self.repeat_input)
                                    .is_ok();
                            }
                            if ui.button("Cancel").clicked() {
                                done = true;
                            }
                        });
                    });
            }
            Prompt::Hotkeys => {
                egui::Window::new("Set Hotkeys")
                    .collapsible(false)
                    .resizable(false)
                    .show(ctx, |ui| {
                        ui.label("Leave a field empty to keep the current key.");
                        egui::Grid::new("hotkeys").num_columns(2).show(ui, |ui| {
                            ui.label(format!("Record ({})", snapshot.hotkeys.record.to_uppercase()));
                            ui.text_edit_singleline(&mut self.record_hotkey_input);
                            ui.end_row();
                            ui.label(format!("Play ({})", snapshot.hotkeys.play.to_uppercase()));
                            ui.text_edit_singleline(&mut self.play_hotkey_input);
                            ui.end_row();
                        });
                        ui.horizontal(|ui| {
                            if ui.button("OK").clicked() {
                                done = self
                                    .controller
                                    .rebind_hotkeys(&self.record_hotkey_input, &self.play_hotkey_input)
                                    .is_ok();
                            }
                            if ui.button("Cancel").clicked() {
                                done = true;
                            }
                        });
                    });
            }
        }

        if done {
            self.prompt = None;
        }
    }

    /// 渲染状态区
    fn render_status(&mut self, ui: &mut egui::Ui, snapshot: &SessionSnapshot) {
        ui.add_space(8.0);
        ui.horizontal(|ui| {
            ui.label("File:");
            ui.add(egui::TextEdit::singleline(&mut self.path_input).desired_width(f32::INFINITY));
        });

        ui.add_space(12.0);
        ui.add(
            egui::ProgressBar::new(f32::from(self.progress) / 100.0)
                .show_percentage()
                .animate(snapshot.playing && !snapshot.paused),
        );

        ui.add_space(8.0);
        let status_color = match self.status {
            Status::Recording => egui::Color32::from_rgb(255, 59, 48),
            Status::Playing => egui::Color32::from_rgb(52, 199, 89),
            Status::Paused => egui::Color32::from_rgb(255, 149, 0),
            Status::Idle | Status::Stopped => egui::Color32::from_rgb(142, 142, 147),
        };
        ui.horizontal(|ui| {
            ui.label(egui::RichText::new(self.status.label()).size(18.0).color(status_color).strong());
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.label(format!(
                    "{} actions  ·  {:.1} s",
                    snapshot.actions,
                    snapshot.recorded_ms / 1000.0
                ));
            });
        });

        ui.label(
            egui::RichText::new(format!(
                "Speed x{}  ·  Repeat {}{}  ·  Rec {}  ·  Play {}",
                snapshot.speed,
                snapshot.repeat_count,
                if snapshot.loop_forever { " (loop)" } else { "" },
                snapshot.hotkeys.record.to_uppercase(),
                snapshot.hotkeys.play.to_uppercase(),
            ))
            .size(12.0)
            .color(egui::Color32::from_rgb(142, 142, 147)),
        );

        // 提示横幅
        if let Some((notice, stamp, _)) = &self.notice {
            ui.add_space(12.0);
            let fill = match notice.level {
                NoticeLevel::Info => egui::Color32::from_rgb(0, 102, 204),
                NoticeLevel::Warning => egui::Color32::from_rgb(255, 59, 48),
            };
            egui::Frame::none()
                .fill(fill)
                .rounding(egui::Rounding::same(8.0))
                .inner_margin(egui::Margin::symmetric(12.0, 8.0))
                .show(ui, |ui| {
                    ui.label(
                        egui::RichText::new(format!("[{}] {}", stamp, notice.title))
                            .color(egui::Color32::WHITE)
                            .strong(),
                    );
                    ui.label(egui::RichText::new(&notice.message).color(egui::Color32::WHITE));
                });
        }
    }
}

impl eframe::App for KeyTapeApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_updates();
        self.poll_tray(ctx);

        // 清除过期的提示
        if let Some((_, _, shown)) = &self.notice {
            if shown.elapsed() >= NOTICE_TTL {
                self.notice = None;
            }
        }

        let snapshot = self.controller.snapshot();

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            self.render_toolbar(ui, &snapshot);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.render_status(ui, &snapshot);
        });

        self.render_prompt(ctx, &snapshot);

        // 热键和后台线程会改变状态，需要持续刷新
        ctx.request_repaint_after(Duration::from_millis(100));
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.close();
    }
}

fn save_settings(settings: &Settings) {
    match settings.save() {
        Ok(()) => info!("设置已保存"),
        Err(e) => warn!("保存设置失败: {}", e),
    }
}

/// 配置视觉效果
fn configure_style(ctx: &egui::Context) {
    let mut style = (*ctx.style()).clone();

    style.visuals.window_rounding = egui::Rounding::same(12.0);
    style.visuals.widgets.inactive.rounding = egui::Rounding::same(8.0);
    style.visuals.widgets.hovered.rounding = egui::Rounding::same(8.0);
    style.visuals.widgets.active.rounding = egui::Rounding::same(8.0);
    style.visuals.selection.bg_fill = egui::Color32::from_rgb(0, 102, 204);

    style.spacing.item_spacing = egui::vec2(8.0, 8.0);
    style.spacing.button_padding = egui::vec2(10.0, 6.0);

    ctx.set_style(style);
}

/// 启动 GUI
pub fn run_gui(controller: SessionController, tray: Option<SystemTray>) -> eframe::Result<()> {
    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(config::APP_NAME)
            .with_inner_size([560.0, 280.0])
            .with_min_inner_size([480.0, 240.0]),
        ..Default::default()
    };

    eframe::run_native(
        config::APP_NAME,
        native_options,
        Box::new(move |cc| Ok(Box::new(KeyTapeApp::new(cc, controller, tray)))),
    )
}
