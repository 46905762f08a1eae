use std::fs::File;
use std::time::Duration;

use anyhow::Result;
use egui::ComboBox;
use tracing::info;

use serterm::connection::SystemSerial;
use serterm::terminal::Terminal;
use serterm::serial_port_list;

const LOG_FILE: &str = "serterm.log";

struct App {
    terminal: Terminal,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(File::create(LOG_FILE)?)
        .with_ansi(false)
        .init();

    info!("starting serterm");

    let app = App {
        terminal: Terminal::new(Box::new(SystemSerial), serial_port_list()),
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([800.0, 600.0]),
        ..Default::default()
    };
    eframe::run_native("SerTerm", options, Box::new(|_| Ok(Box::new(app))))
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    Ok(())
}

impl eframe::App for App {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.terminal.poll();

        // Top control bar
        egui::TopBottomPanel::top("controls").show(ctx, |ui| {
            ui.horizontal(|ui| {
                let connected = self.terminal.is_connected();

                ui.add_enabled_ui(!connected, |ui| {
                    ui.label("Port");
                    ComboBox::from_id_salt("port_dropdown")
                        .selected_text(
                            self.terminal
                                .ports
                                .get(self.terminal.port_choice)
                                .cloned()
                                .unwrap_or_else(|| "No available port".to_string()),
                        )
                        .show_ui(ui, |ui| {
                            for (idx, port) in self.terminal.ports.iter().enumerate() {
                                ui.selectable_value(&mut self.terminal.port_choice, idx, port);
                            }
                        });

                    if ui.button("↻").clicked() {
                        self.terminal.set_ports(serial_port_list());
                    }

                    ui.label("Baudrate");
                    ComboBox::from_id_salt("baud_dropdown")
                        .selected_text(self.terminal.bauds[self.terminal.baud_choice].as_ref())
                        .show_ui(ui, |ui| {
                            for (idx, baud) in self.terminal.bauds.iter().enumerate() {
                                ui.selectable_value(
                                    &mut self.terminal.baud_choice,
                                    idx,
                                    baud.as_ref(),
                                );
                            }
                        });
                });

                if ui
                    .button(if connected { "Disconnect" } else { "Connect" })
                    .clicked()
                {
                    if connected {
                        self.terminal.disconnect();
                    } else {
                        self.terminal.connect();
                    }
                }
            });
        });

        // Send bar, enabled only while connected
        egui::TopBottomPanel::bottom("send_bar").show(ctx, |ui| {
            ui.add_space(4.0);
            ui.horizontal(|ui| {
                ui.add_enabled_ui(self.terminal.is_connected(), |ui| {
                    let resp = ui.add(
                        egui::TextEdit::singleline(&mut self.terminal.input)
                            .desired_width(ui.available_width() - 60.0)
                            .hint_text("command")
                            .font(egui::TextStyle::Monospace),
                    );
                    if resp.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                        self.terminal.submit();
                        resp.request_focus();
                    }

                    if ui.button("Send").clicked() {
                        self.terminal.submit();
                    }
                });
            });
            ui.add_space(4.0);
        });

        // Terminal log
        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical()
                .auto_shrink([false; 2])
                .stick_to_bottom(true)
                .show(ui, |ui| {
                    ui.style_mut().override_text_style = Some(egui::TextStyle::Monospace);
                    for line in self.terminal.log() {
                        ui.label(format!("[{}] {}", line.stamp.format("%H:%M:%S"), line.text));
                    }
                });
        });

        ctx.request_repaint_after(Duration::from_millis(100));
    }
}
