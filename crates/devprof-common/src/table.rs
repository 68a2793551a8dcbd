//! Human-readable dump of a set of device records.
//!
//! One row per property, one column per record. Purely cosmetic; nothing
//! parses this output.

use tracing::info;
use yansi::Paint;

use crate::types::{DeviceRecord, GpuSupport, NumericFormat};

type Cell = Box<dyn Fn(&DeviceRecord) -> String>;

fn row(
    label: impl Into<String>,
    cell: impl Fn(&DeviceRecord) -> String + 'static,
) -> (String, Cell) {
    (label.into(), Box::new(cell))
}

fn gib(v: f32) -> String {
    format!("{v:.2}")
}

fn per_format_rows<T: std::fmt::Display + 'static>(
    rows: &mut Vec<(String, Cell)>,
    label: &str,
    unit: &str,
    get: fn(&DeviceRecord, NumericFormat) -> T,
) {
    for format in NumericFormat::ALL {
        rows.push(row(format!("{label} ({format} x f32{unit})"), move |r| {
            format!("{:.2}", get(r, format))
        }));
    }
}

fn rows() -> Vec<(String, Cell)> {
    let mut rows = vec![
        row("Rank", |r| r.rank.to_string()),
        row("Device Name", |r| r.device_name.clone()),
        row("CPU Name", |r| r.cpu_props.name.clone()),
        row("CPU Description", |r| r.cpu_props.description.clone()),
        row("Number of CPU cores", |r| r.cpu_props.cores.to_string()),
    ];
    per_format_rows(&mut rows, "CPU flops", ", GFLOPS", |r, f| {
        r.cpu_props.flops.get(f)
    });

    let memory: [(&str, fn(&DeviceRecord) -> f32); 5] = [
        ("Physical Mem Total (GiB)", |r| r.memory.total_physical),
        ("Physical Mem Available (GiB)", |r| r.memory.available_physical),
        ("Swap Mem Total (GiB)", |r| r.memory.total_swap),
        ("Swap Mem Available (GiB)", |r| r.memory.available_swap),
        ("Mem Read Bandwidth (GB/s)", |r| r.memory.cpu_read_ram_bw),
    ];
    let disk: [(&str, fn(&DeviceRecord) -> f32); 4] = [
        ("Disk Read Seq Speed (GB/s)", |r| r.disk.read_seq_bw),
        ("Disk Read Rnd Speed (GB/s)", |r| r.disk.read_rnd_bw),
        ("Disk Write Seq Speed (GB/s)", |r| r.disk.write_seq_bw),
        ("Disk Write Rnd Speed (GB/s)", |r| r.disk.write_rnd_bw),
    ];
    for (label, get) in memory.into_iter().chain(disk) {
        rows.push(row(label, move |r| gib(get(r))));
    }

    for (i, name) in GpuSupport::NAMES.into_iter().enumerate() {
        rows.push(row(format!("GPU {name}"), move |r| {
            (r.gpu_support.to_array()[i] as u8).to_string()
        }));
    }

    rows.push(row("GPU Name", |r| r.gpu_props.name.clone()));
    rows.push(row("GPU Description", |r| r.gpu_props.description.clone()));
    rows.push(row("GPU Mem Free (GiB)", |r| gib(r.gpu_props.memory_free)));
    rows.push(row("GPU Mem Total (GiB)", |r| gib(r.gpu_props.memory_total)));
    rows.push(row("Metal VRAM Read Bandwidth (GB/s)", |r| {
        gib(r.gpu_props.metal.read_vram_bw)
    }));
    per_format_rows(&mut rows, "Metal flops", ", GFLOPS", |r, f| {
        r.gpu_props.metal.flops.get(f)
    });
    rows.push(row("CUDA VRAM Read Bandwidth (GB/s)", |r| {
        gib(r.gpu_props.cuda.read_vram_bw)
    }));
    per_format_rows(&mut rows, "CUDA flops", ", GFLOPS", |r, f| {
        r.gpu_props.cuda.flops.get(f)
    });

    rows.push(row("Model input embedding (ms)", |r| {
        format!("{:.2}", r.model_flops.inp_embd_ms)
    }));
    per_format_rows(&mut rows, "Model output flops", "", |r, f| {
        r.model_flops.output.get(f)
    });
    per_format_rows(&mut rows, "Model layer flops", "", |r, f| {
        r.model_flops.layer.get(f)
    });
    per_format_rows(&mut rows, "Model input params", "", |r, f| {
        r.model_params.input.get(f)
    });
    per_format_rows(&mut rows, "Model output params", "", |r, f| {
        r.model_params.output.get(f)
    });
    per_format_rows(&mut rows, "Model layer params", "", |r, f| {
        r.model_params.layer.get(f)
    });
    rows
}

/// Render the records as a table, one column per record in the given order
///
/// When `color` is set the label column is bolded with ANSI escapes.
pub fn render_table(records: &[DeviceRecord], color: bool) -> String {
    let rows = rows();
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|(_, cell)| records.iter().map(|r| cell(r)).collect())
        .collect();

    let label_width = rows.iter().map(|(l, _)| l.len()).max().unwrap_or(0);
    let widths: Vec<usize> = (0..records.len())
        .map(|col| {
            cells
                .iter()
                .map(|row| row[col].chars().count())
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = String::new();
    for ((label, _), row) in rows.iter().zip(&cells) {
        let padded = format!("{label:<label_width$}");
        if color {
            out.push_str(&padded.bold().to_string());
        } else {
            out.push_str(&padded);
        }
        for (value, width) in row.iter().zip(&widths) {
            out.push_str(" | ");
            out.push_str(&format!("{value:<width$}"));
        }
        out.push('\n');
    }
    out
}

/// Emit the table through the logging sink, one event per line
pub fn log_table(records: &[DeviceRecord], color: bool) {
    for line in render_table(records, color).lines() {
        info!("{}", line.trim_end());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_column_per_record() {
        let mut a = DeviceRecord::new(0);
        a.device_name = "alpha".into();
        let mut b = DeviceRecord::new(1);
        b.device_name = "beta-host".into();
        b.gpu_support.cuda = true;

        let table = render_table(&[a, b], false);
        let lines: Vec<&str> = table.lines().collect();
        assert!(lines[0].starts_with("Rank"));
        assert!(lines[0].contains(" | 0 "));
        assert!(lines[0].trim_end().ends_with("| 1"));
        assert!(lines[1].contains("alpha") && lines[1].contains("beta-host"));

        let cuda = lines.iter().find(|l| l.starts_with("GPU cuda")).unwrap();
        let cols: Vec<&str> = cuda.split('|').map(str::trim).collect();
        assert_eq!(&cols[1..], &["0", "1"]);
    }

    #[test]
    fn lists_every_format() {
        let table = render_table(&[DeviceRecord::new(0)], false);
        for format in NumericFormat::ALL {
            assert!(table.contains(&format!("CPU flops ({format} x f32, GFLOPS)")));
            assert!(table.contains(&format!("Model layer params ({format} x f32)")));
        }
    }

    #[test]
    fn color_bolds_labels_only() {
        let record = DeviceRecord::new(9);
        let plain = render_table(std::slice::from_ref(&record), false);
        let colored = render_table(std::slice::from_ref(&record), true);
        assert!(!plain.contains('\u{1b}'));

        let first = colored.lines().next().unwrap();
        assert!(first.starts_with("\u{1b}[1m"), "{first:?}");
        assert!(first.ends_with(" | 9"), "{first:?}");
        assert_eq!(colored.lines().count(), plain.lines().count());
    }

    #[test]
    fn empty_set_renders_labels_only() {
        let table = render_table(&[], false);
        assert!(table.lines().all(|l| !l.contains('|')));
    }
}
