use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use svg::{
    node::element::{Circle, Rectangle},
    Document,
};

use splash_sph::{color_map::ColorMap, floating_type_mod::FT, FluidSimulation, GridFluid, Solver};

/// Writes one SVG file per exported frame. Particles are colored by density, grid cells by dye.
pub struct SvgExporter {
    directory: PathBuf,
    color_map: ColorMap,
}

impl SvgExporter {
    pub fn new(directory: impl AsRef<Path>) -> Result<SvgExporter> {
        let directory = directory.as_ref().to_path_buf();
        std::fs::create_dir_all(&directory)
            .with_context(|| format!("failed creating svg directory `{}`", directory.display()))?;
        Ok(SvgExporter {
            directory,
            color_map: ColorMap::water(),
        })
    }

    pub fn write_frame(&self, frame: usize, solver: &Solver) -> Result<PathBuf> {
        let document = match solver {
            Solver::Particles(simulation) => particles_document(simulation, &self.color_map),
            Solver::Grid(fluid) => grid_document(fluid, &self.color_map),
        };

        let path = self.directory.join(format!("frame-{:05}.svg", frame));
        svg::save(&path, &document).with_context(|| format!("failed writing `{}`", path.display()))?;
        Ok(path)
    }
}

fn background(width: FT, height: FT) -> Document {
    Document::new()
        .set("viewBox", format!("0 0 {} {}", width, height))
        .set("width", width)
        .set("height", height)
        .add(
            Rectangle::new()
                .set("x", 0)
                .set("y", 0)
                .set("width", width)
                .set("height", height)
                .set("fill", "#101418"),
        )
}

pub fn particles_document(simulation: &FluidSimulation, color_map: &ColorMap) -> Document {
    let domain = simulation.domain();
    let mut document = background(domain.width, domain.height);

    // rest density sits in the middle of the color range
    let max_density = 2. * simulation.params().rest_density;
    for p in simulation.particles().iter() {
        document = document.add(
            Circle::new()
                .set("cx", p.position.x)
                .set("cy", p.position.y)
                .set("r", p.radius)
                .set("fill", color_map.get_hex(p.density / max_density)),
        );
    }
    document
}

pub fn grid_document(fluid: &GridFluid, color_map: &ColorMap) -> Document {
    let domain = fluid.domain();
    let mut document = background(domain.width, domain.height);

    let resolution = fluid.resolution();
    let cell_size = fluid.cell_size();
    let max_dye = (0..resolution)
        .flat_map(|j| (0..resolution).map(move |i| (i, j)))
        .map(|(i, j)| fluid.dye_at(i, j))
        .fold(0., FT::max);

    for j in 0..resolution {
        for i in 0..resolution {
            let dye = fluid.dye_at(i, j);
            if dye <= 0. {
                continue;
            }
            let corner = fluid.cell_center(i, j) - cell_size * 0.5;
            document = document.add(
                Rectangle::new()
                    .set("x", corner.x)
                    .set("y", corner.y)
                    .set("width", cell_size.x)
                    .set("height", cell_size.y)
                    .set("fill", color_map.get_hex(dye / max_dye)),
            );
        }
    }
    document
}

#[test]
fn particle_document_has_one_circle_per_particle() {
    use splash_sph::{vec2f, SimulationParams, V2};

    let mut simulation = FluidSimulation::new(SimulationParams::default().with_spawn_rate(0), 100., 80.).unwrap();
    simulation.add_particle(vec2f(10., 10.), V2::zeros(), 3.).unwrap();
    simulation.add_particle(vec2f(50., 40.), V2::zeros(), 3.).unwrap();

    let svg = particles_document(&simulation, &ColorMap::water()).to_string();
    assert_eq!(svg.matches("<circle").count(), 2);
    assert!(svg.contains("viewBox"));
}
