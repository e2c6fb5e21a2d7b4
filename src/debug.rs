impl std::fmt::Debug for crate::village::Village {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Village")
            .field("id", &self.id)
            .field("breed", &self.breed)
            .field("at", &format_args!("({}, {})", self.coords.x, self.coords.y))
            .field("population", &self.population)
            .field("total_k", &self.total_k)
            .field("cells", &self.land.len())
            .field("time_here", &self.time_here)
            .field("active", &self.active)
            .finish()
    }
}

impl std::fmt::Debug for crate::calibration::Genome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Genome")
            .field("fitness", &self.fitness)
            .field("genes", &format_args!("{}", self))
            .finish()
    }
}
